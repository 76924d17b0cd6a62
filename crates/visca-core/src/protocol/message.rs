//! Outbound messages
//!
//! A [`Command`] is fire-and-forget: the camera ACKs it into a socket and
//! later reports Completion or an error. An [`Inquiry`] is answered with a
//! single terminal frame decoded through its [`AnswerTemplate`].
//!
//! Module-defined messages come from the catalogue and are trusted. Messages
//! typed by a host user are parsed from text such as `"81 01 04 3F 02 pp FF"`
//! and validated byte by byte before anything is sent.

use std::collections::BTreeMap;

use super::error::ViscaError;
use super::frame::{HexBytes, TERMINATOR};
use super::params::{
    Answer, AnswerTemplate, ByteTemplate, FieldRule, Options, Param, MAX_PARAM_NIBBLES,
};
use super::MAX_MESSAGE_LEN;

/// Where a message definition came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Built into the catalogue, fixed shape
    ModuleDefined,
    /// Entered by a host user, validated before every send
    UserDefined,
}

/// A command message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    description: String,
    template: ByteTemplate,
    origin: Origin,
}

impl Command {
    /// A catalogue command with fixed bytes; add fields with [`Command::param`]
    pub fn new(description: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            description: description.into(),
            template: ByteTemplate::new(bytes),
            origin: Origin::ModuleDefined,
        }
    }

    /// Add a parameter field
    pub fn param(mut self, name: &str, nibbles: &[usize], rule: FieldRule) -> Self {
        self.template.push_param(Param::new(name, nibbles, rule));
        self
    }

    /// Parse a user-entered command such as `"81 01 04 3F 02 pp FF"`.
    ///
    /// Each lowercase letter `g`..=`z` is one nibble of a parameter named by
    /// that letter; repeated letters extend the parameter, most significant
    /// nibble first.
    pub fn user_defined(description: impl Into<String>, text: &str) -> Result<Self, ViscaError> {
        let (bytes, params) = parse_template(text)?;
        Ok(Self {
            description: description.into(),
            template: ByteTemplate::with_params(bytes, params),
            origin: Origin::UserDefined,
        })
    }

    /// Name used in logs and error messages
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Where the definition came from
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Bytes and parameter fields
    pub fn template(&self) -> &ByteTemplate {
        &self.template
    }

    /// Produce wire bytes; user-defined results are validated first
    pub fn encode(&self, options: &Options) -> Result<Vec<u8>, ViscaError> {
        let bytes = self.template.encode(options)?;
        if self.origin == Origin::UserDefined {
            validate_message(&bytes)?;
        }
        Ok(bytes)
    }
}

/// An inquiry message and the shape of its answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inquiry {
    description: String,
    bytes: Vec<u8>,
    answer: AnswerTemplate,
    origin: Origin,
}

impl Inquiry {
    /// A catalogue inquiry and the answer it expects
    pub fn new(description: impl Into<String>, bytes: Vec<u8>, answer: AnswerTemplate) -> Self {
        Self {
            description: description.into(),
            bytes,
            answer,
            origin: Origin::ModuleDefined,
        }
    }

    /// Parse a user-entered inquiry and its expected answer, e.g.
    /// `("81 09 04 38 FF", "90 50 0p FF")`. Answer placeholders decode as
    /// raw numbers named by their letter.
    pub fn user_defined(
        description: impl Into<String>,
        text: &str,
        answer_text: &str,
    ) -> Result<Self, ViscaError> {
        let (bytes, params) = parse_template(text)?;
        if !params.is_empty() {
            return Err(ViscaError::InvalidMessage(
                "inquiries take no parameters".to_string(),
            ));
        }
        let (value, answer_params) = parse_template(answer_text)?;
        Ok(Self {
            description: description.into(),
            bytes,
            answer: AnswerTemplate::new(value, answer_params),
            origin: Origin::UserDefined,
        })
    }

    /// Name used in logs and error messages
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Where the definition came from
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Expected answer shape
    pub fn answer_template(&self) -> &AnswerTemplate {
        &self.answer
    }

    /// Produce wire bytes; user-defined inquiries are validated first
    pub fn encode(&self) -> Result<Vec<u8>, ViscaError> {
        if self.origin == Origin::UserDefined {
            validate_message(&self.bytes)?;
        }
        Ok(self.bytes.clone())
    }

    /// Decode an answer frame against this inquiry's template
    pub fn decode_answer(&self, bytes: &[u8]) -> Result<Answer, ViscaError> {
        self.answer
            .decode(bytes)
            .map_err(|detail| ViscaError::IncompatibleAnswer {
                description: self.description.clone(),
                detail,
            })
    }
}

/// Check the framing every controller message must have
pub fn validate_message(bytes: &[u8]) -> Result<(), ViscaError> {
    let invalid = |why: &str| {
        Err(ViscaError::InvalidMessage(format!(
            "{} ({})",
            why,
            HexBytes::from(bytes)
        )))
    };

    if bytes.len() < 3 || bytes.len() > MAX_MESSAGE_LEN {
        return invalid("length must be 3 to 16 bytes");
    }
    if !(0x81..=0x88).contains(&bytes[0]) {
        return invalid("first byte must address a camera (81 to 88)");
    }
    if bytes[bytes.len() - 1] != TERMINATOR {
        return invalid("last byte must be FF");
    }
    if bytes[..bytes.len() - 1].contains(&TERMINATOR) {
        return invalid("FF may only terminate the message");
    }
    Ok(())
}

/// Parse space-separated two-character tokens into template bytes and
/// letter-named parameters.
fn parse_template(text: &str) -> Result<(Vec<u8>, Vec<Param>), ViscaError> {
    let mut bytes = Vec::new();
    let mut fields: BTreeMap<char, Vec<usize>> = BTreeMap::new();

    for (i, token) in text.split_whitespace().enumerate() {
        let chars: Vec<char> = token.chars().collect();
        if chars.len() != 2 {
            return Err(ViscaError::InvalidMessage(format!(
                "'{}' is not a two-character byte",
                token
            )));
        }

        let mut byte = 0u8;
        for (half, &c) in chars.iter().enumerate() {
            let nibble_index = 2 * i + half;
            let value = match c {
                '0'..='9' | 'a'..='f' | 'A'..='F' => c.to_digit(16).map(|d| d as u8),
                'g'..='z' => {
                    fields.entry(c).or_default().push(nibble_index);
                    Some(0)
                }
                _ => None,
            }
            .ok_or_else(|| {
                ViscaError::InvalidMessage(format!("'{}' is not a hex byte", token))
            })?;
            byte = (byte << 4) | value;
        }
        bytes.push(byte);
    }

    if bytes.is_empty() {
        return Err(ViscaError::InvalidMessage("message is empty".to_string()));
    }
    if let Some((c, nibbles)) = fields.iter().find(|(_, n)| n.len() > MAX_PARAM_NIBBLES) {
        return Err(ViscaError::InvalidMessage(format!(
            "placeholder '{}' spans {} nibbles, at most {} allowed",
            c,
            nibbles.len(),
            MAX_PARAM_NIBBLES
        )));
    }

    let params = fields
        .into_iter()
        .map(|(c, nibbles)| Param::new(c.to_string(), &nibbles, FieldRule::Raw))
        .collect();
    Ok((bytes, params))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_user_defined_fixed_bytes() {
        let cmd = Command::user_defined("home", "81 01 06 04 FF").unwrap();
        assert_eq!(cmd.origin(), Origin::UserDefined);
        assert_eq!(
            cmd.encode(&Options::new()).unwrap(),
            vec![0x81, 0x01, 0x06, 0x04, 0xFF]
        );
    }

    #[test]
    fn test_user_defined_placeholders() {
        let cmd = Command::user_defined("recall", "81 01 04 3f 02 pp ff").unwrap();
        let bytes = cmd.encode(&Options::new().with("p", 0x2A)).unwrap();
        assert_eq!(bytes, vec![0x81, 0x01, 0x04, 0x3F, 0x02, 0x2A, 0xFF]);
    }

    #[test]
    fn test_user_defined_split_placeholder() {
        let cmd = Command::user_defined("zoom", "81 01 04 47 0p 0p 0p 0p FF").unwrap();
        let bytes = cmd.encode(&Options::new().with("p", 0x1234)).unwrap();
        assert_eq!(
            bytes,
            vec![0x81, 0x01, 0x04, 0x47, 0x01, 0x02, 0x03, 0x04, 0xFF]
        );
    }

    #[test]
    fn test_user_defined_bad_tokens() {
        for text in ["81 01 1FF FF", "81 01 G1 FF", "81 01 0- FF", ""] {
            assert!(
                matches!(
                    Command::user_defined("bad", text),
                    Err(ViscaError::InvalidMessage(_))
                ),
                "{text:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_user_defined_framing_checked_on_encode() {
        // Parameter value produces an interior terminator
        let cmd = Command::user_defined("x", "81 01 04 3F 02 pp FF").unwrap();
        assert!(matches!(
            cmd.encode(&Options::new().with("p", 0xFF)),
            Err(ViscaError::InvalidMessage(_))
        ));

        let cmd = Command::user_defined("x", "01 01 FF").unwrap();
        assert!(matches!(
            cmd.encode(&Options::new()),
            Err(ViscaError::InvalidMessage(_))
        ));

        let cmd = Command::user_defined("x", "81 01 04").unwrap();
        assert!(matches!(
            cmd.encode(&Options::new()),
            Err(ViscaError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_module_defined_skips_framing_check() {
        let cmd = Command::new("raw", vec![0x01, 0x02]);
        assert_eq!(cmd.encode(&Options::new()).unwrap(), vec![0x01, 0x02]);
    }

    #[test]
    fn test_validate_message_length() {
        let mut long = vec![0x81];
        long.extend(std::iter::repeat(0x00).take(15));
        long.push(0xFF);
        assert_eq!(long.len(), 17);
        assert!(validate_message(&long).is_err());
        assert!(validate_message(&long[1..]).is_err());
    }

    #[test]
    fn test_user_defined_inquiry() {
        let inq = Inquiry::user_defined("focus mode", "81 09 04 38 FF", "90 50 0p FF").unwrap();
        assert_eq!(inq.encode().unwrap(), vec![0x81, 0x09, 0x04, 0x38, 0xFF]);

        let answer = inq.decode_answer(&[0x90, 0x50, 0x02, 0xFF]).unwrap();
        assert_eq!(answer.number("p"), Some(2));

        assert!(matches!(
            inq.decode_answer(&[0x90, 0x50, 0x12, 0xFF]),
            Err(ViscaError::IncompatibleAnswer { .. })
        ));
    }

    #[test]
    fn test_user_defined_placeholder_width_limit() {
        let eight = Command::user_defined("wide", "81 01 pp pp pp pp FF").unwrap();
        assert_eq!(
            eight.encode(&Options::new().with("p", 0x0102_0304)).unwrap(),
            vec![0x81, 0x01, 0x01, 0x02, 0x03, 0x04, 0xFF]
        );

        for text in ["81 01 pp pp pp pp pp FF", "81 01 pp pp pp pp pp pp pp pp FF"] {
            match Command::user_defined("wide", text) {
                Err(ViscaError::InvalidMessage(why)) => assert!(why.contains("'p'"), "{}", why),
                other => panic!("{text:?} should be rejected, got {:?}", other),
            }
        }
        assert!(matches!(
            Inquiry::user_defined("wide", "81 09 04 47 FF", "90 50 pp pp pp pp pp FF"),
            Err(ViscaError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_user_defined_inquiry_rejects_parameters() {
        assert!(Inquiry::user_defined("x", "81 09 04 pp FF", "90 50 0p FF").is_err());
    }
}
