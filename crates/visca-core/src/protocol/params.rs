//! Parameter codec
//!
//! Messages carry their variable parts in nibbles. A [`Param`] names a field,
//! lists the nibble positions it occupies (most significant first, counted
//! from the high nibble of byte 0) and a [`FieldRule`] converting between the
//! raw nibble value and the typed [`ParamValue`] a host works with.
//!
//! The same rule drives both directions, so a value written into a command
//! reads back identically from the matching inquiry answer.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::error::ViscaError;
use super::frame::HexBytes;

/// Widest field the codec handles; values are carried in a `u32`
pub const MAX_PARAM_NIBBLES: usize = 8;

/// A typed option or answer field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    /// Integer value
    Number(i64),
    /// Named choice from a table
    Choice(String),
}

impl ParamValue {
    /// The number, if this is one
    pub fn as_number(&self) -> Option<i64> {
        match self {
            ParamValue::Number(n) => Some(*n),
            ParamValue::Choice(_) => None,
        }
    }

    /// The choice name, if this is one
    pub fn as_choice(&self) -> Option<&str> {
        match self {
            ParamValue::Choice(s) => Some(s),
            ParamValue::Number(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Number(n) => write!(f, "{}", n),
            ParamValue::Choice(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(n: i64) -> Self {
        ParamValue::Number(n)
    }
}

impl From<i32> for ParamValue {
    fn from(n: i32) -> Self {
        ParamValue::Number(n.into())
    }
}

impl From<u16> for ParamValue {
    fn from(n: u16) -> Self {
        ParamValue::Number(n.into())
    }
}

impl From<u8> for ParamValue {
    fn from(n: u8) -> Self {
        ParamValue::Number(n.into())
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Choice(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Choice(s)
    }
}

/// Named option values supplied when encoding a message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(BTreeMap<String, ParamValue>);

impl Options {
    /// No options
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Set an option
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up an option by name
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }
}

/// Fields decoded from an inquiry answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answer(BTreeMap<String, ParamValue>);

impl Answer {
    /// Look up a field by name
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    /// A numeric field
    pub fn number(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ParamValue::as_number)
    }

    /// A choice field
    pub fn choice(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ParamValue::as_choice)
    }

    /// Fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no fields were decoded
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Conversion between raw nibble value and typed field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// Unsigned integer
    Raw,
    /// Two's complement across the field's nibbles
    Signed,
    /// `value = raw + offset`
    Offset(i64),
    /// Named choices keyed by raw value
    Table(Vec<(u32, &'static str)>),
}

impl FieldRule {
    fn to_raw(&self, value: &ParamValue, width: u32) -> Option<u32> {
        if width == 0 || width as usize > MAX_PARAM_NIBBLES {
            return None;
        }
        let limit = 1u64 << (4 * width);
        match (self, value) {
            (FieldRule::Raw, ParamValue::Number(n)) => {
                u32::try_from(*n).ok().filter(|&r| u64::from(r) < limit)
            }
            (FieldRule::Signed, ParamValue::Number(n)) => {
                let half = (limit / 2) as i64;
                if *n < -half || *n >= half {
                    return None;
                }
                Some((n.rem_euclid(limit as i64)) as u32)
            }
            (FieldRule::Offset(offset), ParamValue::Number(n)) => {
                let raw = n.checked_sub(*offset)?;
                u32::try_from(raw).ok().filter(|&r| u64::from(r) < limit)
            }
            (FieldRule::Table(entries), ParamValue::Choice(name)) => entries
                .iter()
                .find(|(_, label)| *label == name.as_str())
                .map(|(raw, _)| *raw)
                .filter(|&r| u64::from(r) < limit),
            _ => None,
        }
    }

    fn from_raw(&self, raw: u32, width: u32) -> Option<ParamValue> {
        if width == 0 || width as usize > MAX_PARAM_NIBBLES {
            return None;
        }
        match self {
            FieldRule::Raw => Some(ParamValue::Number(raw.into())),
            FieldRule::Signed => {
                let bits = 4 * width;
                let raw = i64::from(raw);
                let value = if raw >= 1 << (bits - 1) {
                    raw - (1 << bits)
                } else {
                    raw
                };
                Some(ParamValue::Number(value))
            }
            FieldRule::Offset(offset) => {
                i64::from(raw).checked_add(*offset).map(ParamValue::Number)
            }
            FieldRule::Table(entries) => entries
                .iter()
                .find(|(r, _)| *r == raw)
                .map(|(_, label)| ParamValue::Choice((*label).to_string())),
        }
    }
}

/// A named field at fixed nibble positions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    /// Option or answer field name
    pub name: String,
    /// Nibble indices, most significant first
    pub nibbles: Vec<usize>,
    /// Conversion between raw and typed value
    pub rule: FieldRule,
}

impl Param {
    /// Field `name` at `nibbles`, converted by `rule`
    pub fn new(name: impl Into<String>, nibbles: &[usize], rule: FieldRule) -> Self {
        Self {
            name: name.into(),
            nibbles: nibbles.to_vec(),
            rule,
        }
    }

    fn width(&self) -> u32 {
        self.nibbles.len() as u32
    }

    /// Field width in nibbles, if the codec can carry it
    fn checked_width(&self) -> Result<u32, String> {
        match self.nibbles.len() {
            1..=MAX_PARAM_NIBBLES => Ok(self.width()),
            n => Err(format!(
                "'{}' spans {} nibbles, expected 1 to {}",
                self.name, n, MAX_PARAM_NIBBLES
            )),
        }
    }
}

fn read_nibble(bytes: &[u8], index: usize) -> u8 {
    let b = bytes[index / 2];
    if index % 2 == 0 {
        b >> 4
    } else {
        b & 0x0F
    }
}

fn write_nibble(bytes: &mut [u8], index: usize, value: u8) {
    let b = &mut bytes[index / 2];
    if index % 2 == 0 {
        *b = (*b & 0x0F) | (value << 4);
    } else {
        *b = (*b & 0xF0) | (value & 0x0F);
    }
}

/// Outbound bytes with zero or more parameter fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteTemplate {
    bytes: Vec<u8>,
    params: Vec<Param>,
}

impl ByteTemplate {
    /// Fixed bytes, no parameters
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            params: Vec::new(),
        }
    }

    /// Bytes with parameter fields
    pub fn with_params(bytes: Vec<u8>, params: Vec<Param>) -> Self {
        Self { bytes, params }
    }

    /// Add a parameter field
    pub fn push_param(&mut self, param: Param) {
        self.params.push(param);
    }

    /// Template bytes before substitution
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parameter fields
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Substitute option values into the template
    pub fn encode(&self, options: &Options) -> Result<Vec<u8>, ViscaError> {
        let mut out = self.bytes.clone();
        for param in &self.params {
            let width = param.checked_width().map_err(ViscaError::InvalidMessage)?;
            let value = options.get(&param.name).ok_or_else(|| {
                ViscaError::InvalidMessage(format!("missing value for '{}'", param.name))
            })?;
            let raw = param.rule.to_raw(value, width).ok_or_else(|| {
                ViscaError::InvalidMessage(format!(
                    "value {} for '{}' does not fit its {} nibble(s)",
                    value,
                    param.name,
                    param.nibbles.len()
                ))
            })?;
            let width = width as usize;
            for (i, &index) in param.nibbles.iter().enumerate() {
                if index / 2 >= out.len() {
                    return Err(ViscaError::InvalidMessage(format!(
                        "'{}' addresses nibble {} past the end of the message",
                        param.name, index
                    )));
                }
                let shift = 4 * (width - 1 - i);
                write_nibble(&mut out, index, ((raw >> shift) & 0x0F) as u8);
            }
        }
        Ok(out)
    }
}

/// Expected shape of an inquiry answer
///
/// Bits set in `mask` must equal the same bits of `value`; the nibbles named
/// by `params` are extracted and converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerTemplate {
    value: Vec<u8>,
    mask: Vec<u8>,
    params: Vec<Param>,
}

impl AnswerTemplate {
    /// Build a template whose mask covers every bit not owned by a param.
    /// The socket nibble of byte 1 is left unchecked.
    pub fn new(value: Vec<u8>, params: Vec<Param>) -> Self {
        let mut mask = vec![0xFF; value.len()];
        if mask.len() > 1 {
            mask[1] = 0xF0;
        }
        for param in &params {
            for &index in &param.nibbles {
                if index / 2 < mask.len() {
                    write_nibble(&mut mask, index, 0);
                }
            }
        }
        Self {
            value,
            mask,
            params,
        }
    }

    /// Expected frame length
    pub fn len(&self) -> usize {
        self.value.len()
    }

    /// True for a template with no bytes
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Fields extracted from the answer
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// Match a received answer frame and extract its fields.
    /// The error string says what did not match.
    pub fn decode(&self, bytes: &[u8]) -> Result<Answer, String> {
        if bytes.len() != self.value.len() {
            return Err(format!(
                "expected {} bytes, got {} in {}",
                self.value.len(),
                bytes.len(),
                HexBytes::from(bytes)
            ));
        }

        for (i, ((&got, &want), &mask)) in bytes
            .iter()
            .zip(self.value.iter())
            .zip(self.mask.iter())
            .enumerate()
        {
            if got & mask != want & mask {
                return Err(format!(
                    "byte {} is {:02X}, expected {:02X} under mask {:02X}",
                    i, got, want, mask
                ));
            }
        }

        let mut fields = BTreeMap::new();
        for param in &self.params {
            let width = param.checked_width()?;
            if let Some(&index) = param.nibbles.iter().find(|&&i| i / 2 >= bytes.len()) {
                return Err(format!(
                    "'{}' addresses nibble {} past the end of the answer",
                    param.name, index
                ));
            }
            let raw = param
                .nibbles
                .iter()
                .fold(0u32, |acc, &index| (acc << 4) | u32::from(read_nibble(bytes, index)));
            let value = param.rule.from_raw(raw, width).ok_or_else(|| {
                format!("no conversion for raw value {:#X} of '{}'", raw, param.name)
            })?;
            fields.insert(param.name.clone(), value);
        }
        Ok(Answer(fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn zoom_command() -> ByteTemplate {
        ByteTemplate::with_params(
            vec![0x81, 0x01, 0x04, 0x47, 0x00, 0x00, 0x00, 0x00, 0xFF],
            vec![Param::new("position", &[9, 11, 13, 15], FieldRule::Raw)],
        )
    }

    fn zoom_answer() -> AnswerTemplate {
        AnswerTemplate::new(
            vec![0x90, 0x50, 0x00, 0x00, 0x00, 0x00, 0xFF],
            vec![Param::new("position", &[5, 7, 9, 11], FieldRule::Raw)],
        )
    }

    #[test]
    fn test_encode_spreads_nibbles() {
        let bytes = zoom_command()
            .encode(&Options::new().with("position", 0x1A2B))
            .unwrap();
        assert_eq!(
            bytes,
            vec![0x81, 0x01, 0x04, 0x47, 0x01, 0x0A, 0x02, 0x0B, 0xFF]
        );
    }

    #[test]
    fn test_encode_rejects_values_that_do_not_fit() {
        let err = zoom_command()
            .encode(&Options::new().with("position", 0x10000))
            .unwrap_err();
        assert!(matches!(err, ViscaError::InvalidMessage(_)));

        let err = zoom_command()
            .encode(&Options::new().with("position", -1))
            .unwrap_err();
        assert!(matches!(err, ViscaError::InvalidMessage(_)));
    }

    #[test]
    fn test_encode_missing_option() {
        assert!(matches!(
            zoom_command().encode(&Options::new()),
            Err(ViscaError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_command_to_answer_roundtrip() {
        for rule_value in [0i64, 1, 0x4000, 0xFFFF] {
            let sent = zoom_command()
                .encode(&Options::new().with("position", rule_value))
                .unwrap();
            // The camera echoes the same nibbles in its answer
            let mut reply = vec![0x90, 0x50];
            reply.extend_from_slice(&sent[4..8]);
            reply.push(0xFF);

            let answer = zoom_answer().decode(&reply).unwrap();
            assert_eq!(answer.number("position"), Some(rule_value));
        }
    }

    #[test]
    fn test_table_roundtrip() {
        let rule = FieldRule::Table(vec![(2, "auto"), (3, "manual")]);
        let cmd = ByteTemplate::with_params(
            vec![0x81, 0x01, 0x04, 0x38, 0x00, 0xFF],
            vec![Param::new("mode", &[9], rule.clone())],
        );
        let sent = cmd.encode(&Options::new().with("mode", "manual")).unwrap();
        assert_eq!(sent[4], 0x03);

        let answer = AnswerTemplate::new(
            vec![0x90, 0x50, 0x00, 0xFF],
            vec![Param::new("mode", &[5], rule)],
        )
        .decode(&[0x90, 0x50, sent[4], 0xFF])
        .unwrap();
        assert_eq!(answer.choice("mode"), Some("manual"));
    }

    #[test]
    fn test_signed_roundtrip() {
        let rule = FieldRule::Signed;
        assert_eq!(rule.to_raw(&ParamValue::Number(-1), 4), Some(0xFFFF));
        assert_eq!(rule.to_raw(&ParamValue::Number(-0x8000), 4), Some(0x8000));
        assert_eq!(rule.to_raw(&ParamValue::Number(0x8000), 4), None);
        assert_eq!(rule.from_raw(0xFFFF, 4), Some(ParamValue::Number(-1)));
        assert_eq!(rule.from_raw(0x0123, 4), Some(ParamValue::Number(0x123)));
    }

    #[test]
    fn test_offset_rule() {
        let rule = FieldRule::Offset(1);
        assert_eq!(rule.to_raw(&ParamValue::Number(1), 2), Some(0));
        assert_eq!(rule.to_raw(&ParamValue::Number(0), 2), None);
        assert_eq!(rule.from_raw(0x0F, 2), Some(ParamValue::Number(16)));
    }

    #[test]
    fn test_decode_length_mismatch() {
        let err = zoom_answer().decode(&[0x90, 0x50, 0x01, 0xFF]).unwrap_err();
        assert!(err.contains("expected 7 bytes"));
    }

    #[test]
    fn test_decode_fixed_bits_mismatch() {
        // high nibble of a param byte is fixed at zero
        let err = zoom_answer()
            .decode(&[0x90, 0x50, 0x10, 0x00, 0x00, 0x00, 0xFF])
            .unwrap_err();
        assert!(err.contains("byte 2"));
    }

    #[test]
    fn test_decode_unmapped_table_value() {
        let template = AnswerTemplate::new(
            vec![0x90, 0x50, 0x00, 0xFF],
            vec![Param::new(
                "mode",
                &[5],
                FieldRule::Table(vec![(2, "auto"), (3, "manual")]),
            )],
        );
        let err = template.decode(&[0x90, 0x50, 0x07, 0xFF]).unwrap_err();
        assert!(err.contains("no conversion"));
    }

    #[test]
    fn test_answer_socket_nibble_is_ignored() {
        let answer = zoom_answer()
            .decode(&[0x90, 0x51, 0x00, 0x00, 0x00, 0x01, 0xFF])
            .unwrap();
        assert_eq!(answer.number("position"), Some(1));
    }

    #[test]
    fn test_eight_nibble_field_roundtrip() {
        let param = Param::new("value", &[4, 5, 6, 7, 8, 9, 10, 11], FieldRule::Raw);
        let template = ByteTemplate::with_params(vec![0x81, 0x01, 0, 0, 0, 0, 0xFF], vec![param.clone()]);
        let sent = template
            .encode(&Options::new().with("value", 0xFFFF_FFFFi64))
            .unwrap();
        assert_eq!(sent, vec![0x81, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);

        let answer = AnswerTemplate::new(vec![0x90, 0x50, 0, 0, 0, 0, 0xFF], vec![param])
            .decode(&[0x90, 0x50, 0x12, 0x34, 0x56, 0x78, 0xFF])
            .unwrap();
        assert_eq!(answer.number("value"), Some(0x1234_5678));
    }

    #[test]
    fn test_encode_rejects_fields_wider_than_codec() {
        for width in [9usize, 10, 16] {
            let nibbles: Vec<usize> = (4..4 + width).collect();
            let template = ByteTemplate::with_params(
                vec![0x81, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF],
                vec![Param::new("p", &nibbles, FieldRule::Raw)],
            );
            match template.encode(&Options::new().with("p", 1)) {
                Err(ViscaError::InvalidMessage(why)) => {
                    assert!(why.contains(&format!("spans {} nibbles", width)), "{}", why)
                }
                other => panic!("expected invalid message, got {:?}", other),
            }
        }
    }

    #[test]
    fn test_decode_rejects_fields_wider_than_codec() {
        // 12 34 56 78 9A must not come back with its top byte dropped
        let template = AnswerTemplate::new(
            vec![0x90, 0x50, 0, 0, 0, 0, 0, 0xFF],
            vec![Param::new("p", &[4, 5, 6, 7, 8, 9, 10, 11, 12, 13], FieldRule::Raw)],
        );
        let err = template
            .decode(&[0x90, 0x50, 0x12, 0x34, 0x56, 0x78, 0x9A, 0xFF])
            .unwrap_err();
        assert!(err.contains("spans 10 nibbles"), "{}", err);
    }

    #[test]
    fn test_zero_width_field_is_rejected() {
        assert_eq!(FieldRule::Signed.from_raw(0, 0), None);
        assert_eq!(FieldRule::Signed.to_raw(&ParamValue::Number(0), 0), None);

        let empty = Param::new("s", &[], FieldRule::Signed);
        assert!(matches!(
            ByteTemplate::with_params(vec![0x81, 0x01, 0xFF], vec![empty.clone()])
                .encode(&Options::new().with("s", 0)),
            Err(ViscaError::InvalidMessage(_))
        ));
        assert!(AnswerTemplate::new(vec![0x90, 0x50, 0xFF], vec![empty])
            .decode(&[0x90, 0x50, 0xFF])
            .is_err());
    }

    #[test]
    fn test_decode_nibble_past_end_is_an_error() {
        let template = AnswerTemplate::new(
            vec![0x90, 0x50, 0xFF],
            vec![Param::new("p", &[9], FieldRule::Raw)],
        );
        assert!(template.decode(&[0x90, 0x50, 0xFF]).is_err());
    }

    #[test]
    fn test_options_deserialize_from_json() {
        let options: Options = serde_json::from_str(r#"{"preset": 4, "mode": "auto"}"#).unwrap();
        assert_eq!(options.get("preset"), Some(&ParamValue::Number(4)));
        assert_eq!(options.get("mode"), Some(&ParamValue::Choice("auto".into())));
    }
}
