//! Inbound frame classification
//!
//! Every reply from the camera is a run of bytes ending in `0xFF`. This
//! module sorts a complete run into exactly one [`Frame`] shape:
//!
//! - `90 4y FF` ACK, command accepted into socket `y`
//! - `90 5y FF` Completion of the command in socket `y`
//! - `90 5y <payload> FF` inquiry answer
//! - `90 6y <code> FF` error, general when `y == 0`, socket-bound otherwise
//! - `z0 38 FF` unsolicited network-change notification
//!
//! Anything else is [`Malformed`].

use std::fmt;

use super::error::Desync;

/// First byte of every reply from camera address 1
pub const REPLY_START: u8 = 0x90;

/// Last byte of every message in either direction
pub const TERMINATOR: u8 = 0xFF;

const KIND_ACK: u8 = 0x40;
const KIND_COMPLETION: u8 = 0x50;
const KIND_ERROR: u8 = 0x60;

const CODE_SYNTAX: u8 = 0x02;
const CODE_BUFFER_FULL: u8 = 0x03;
const CODE_NOT_EXECUTABLE: u8 = 0x41;

const NETWORK_CHANGE: u8 = 0x38;

/// Byte slice rendered as space-separated hex, for logs and error text
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HexBytes(pub Vec<u8>);

impl From<&[u8]> for HexBytes {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl fmt::Display for HexBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{:02X}", b)?;
        }
        f.write_str("]")
    }
}

/// An error reply whose code and generality are both recognized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReply {
    /// `90 60 02 FF`
    SyntaxError,
    /// `90 60 03 FF`
    BufferFull,
    /// `90 6y 41 FF`, `y` in 1..=15
    NotExecutable {
        /// Socket whose command could not run
        socket: u8,
    },
}

/// Reply bytes that fit none of the recognized shapes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Malformed {
    /// First byte is not `90`
    BadStartByte(Vec<u8>),
    /// ACK-shaped but longer than three bytes
    Ack(Vec<u8>),
    /// Error code unknown or with the wrong generality
    UnrecognizedError(Vec<u8>),
    /// Error-shaped but not four bytes
    ErrorLength(Vec<u8>),
    /// No known shape
    Unrecognized(Vec<u8>),
    /// Count of bytes seen without a terminator
    Oversized(usize),
}

impl From<Malformed> for Desync {
    fn from(m: Malformed) -> Self {
        match m {
            Malformed::BadStartByte(b) => Desync::BadStartByte(HexBytes(b)),
            Malformed::Ack(b) => Desync::MalformedAck(HexBytes(b)),
            Malformed::UnrecognizedError(b) => Desync::UnrecognizedError(HexBytes(b)),
            Malformed::ErrorLength(b) => Desync::ErrorOfUnexpectedLength(HexBytes(b)),
            Malformed::Unrecognized(b) => Desync::UnrecognizedFormat(HexBytes(b)),
            Malformed::Oversized(n) => Desync::Oversized(n),
        }
    }
}

/// One decoded reply from the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Command accepted into `socket`
    Ack {
        /// Socket the camera assigned
        socket: u8,
    },
    /// Command in `socket` finished
    Completion {
        /// Socket that finished
        socket: u8,
    },
    /// Inquiry answer; `bytes` is the whole frame including start and terminator
    Answer {
        /// Low nibble of byte 1
        socket: u8,
        /// The whole frame
        bytes: Vec<u8>,
    },
    /// Recognized error reply
    Error(ErrorReply),
    /// Unsolicited network-change notice
    NetworkChange,
    /// Bytes of no recognized shape
    Malformed(Malformed),
}

impl Frame {
    /// Classify one terminated run of bytes
    pub fn parse(bytes: &[u8]) -> Frame {
        if bytes.len() < 2 || bytes[bytes.len() - 1] != TERMINATOR {
            return Frame::Malformed(Malformed::Unrecognized(bytes.to_vec()));
        }

        if is_network_change(bytes) {
            return Frame::NetworkChange;
        }

        if bytes[0] != REPLY_START {
            return Frame::Malformed(Malformed::BadStartByte(bytes.to_vec()));
        }

        if bytes.len() < 3 {
            return Frame::Malformed(Malformed::Unrecognized(bytes.to_vec()));
        }

        let socket = bytes[1] & 0x0F;
        match bytes[1] & 0xF0 {
            KIND_ACK => {
                if bytes.len() == 3 {
                    Frame::Ack { socket }
                } else {
                    Frame::Malformed(Malformed::Ack(bytes.to_vec()))
                }
            }
            KIND_COMPLETION => {
                if bytes.len() == 3 {
                    Frame::Completion { socket }
                } else {
                    Frame::Answer {
                        socket,
                        bytes: bytes.to_vec(),
                    }
                }
            }
            KIND_ERROR => parse_error(socket, bytes),
            _ => Frame::Malformed(Malformed::Unrecognized(bytes.to_vec())),
        }
    }

    /// Short name for log lines
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Ack { .. } => "ack",
            Frame::Completion { .. } => "completion",
            Frame::Answer { .. } => "answer",
            Frame::Error(_) => "error",
            Frame::NetworkChange => "network-change",
            Frame::Malformed(_) => "malformed",
        }
    }
}

fn parse_error(socket: u8, bytes: &[u8]) -> Frame {
    if bytes.len() != 4 {
        return Frame::Malformed(Malformed::ErrorLength(bytes.to_vec()));
    }

    // Generality is part of the code's meaning: a swap is not a known error.
    match (socket, bytes[2]) {
        (0, CODE_SYNTAX) => Frame::Error(ErrorReply::SyntaxError),
        (0, CODE_BUFFER_FULL) => Frame::Error(ErrorReply::BufferFull),
        (1..=15, CODE_NOT_EXECUTABLE) => Frame::Error(ErrorReply::NotExecutable { socket }),
        _ => Frame::Malformed(Malformed::UnrecognizedError(bytes.to_vec())),
    }
}

fn is_network_change(bytes: &[u8]) -> bool {
    bytes.len() == 3 && bytes[0] >= 0x80 && bytes[0] & 0x0F == 0 && bytes[1] == NETWORK_CHANGE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ack_and_completion_every_socket() {
        for y in 0u8..16 {
            assert_eq!(Frame::parse(&[0x90, 0x40 | y, 0xFF]), Frame::Ack { socket: y });
            assert_eq!(
                Frame::parse(&[0x90, 0x50 | y, 0xFF]),
                Frame::Completion { socket: y }
            );
        }
    }

    #[test]
    fn test_answer_keeps_whole_frame() {
        let bytes = [0x90, 0x50, 0x02, 0xFF];
        assert_eq!(
            Frame::parse(&bytes),
            Frame::Answer {
                socket: 0,
                bytes: bytes.to_vec()
            }
        );
    }

    #[test]
    fn test_recognized_errors() {
        assert_eq!(
            Frame::parse(&[0x90, 0x60, 0x02, 0xFF]),
            Frame::Error(ErrorReply::SyntaxError)
        );
        assert_eq!(
            Frame::parse(&[0x90, 0x60, 0x03, 0xFF]),
            Frame::Error(ErrorReply::BufferFull)
        );
        assert_eq!(
            Frame::parse(&[0x90, 0x62, 0x41, 0xFF]),
            Frame::Error(ErrorReply::NotExecutable { socket: 2 })
        );
    }

    #[test]
    fn test_generality_swap_is_unrecognized() {
        for bytes in [
            [0x90, 0x60, 0x41, 0xFF],
            [0x90, 0x61, 0x02, 0xFF],
            [0x90, 0x61, 0x03, 0xFF],
            [0x90, 0x60, 0x04, 0xFF],
        ] {
            assert_eq!(
                Frame::parse(&bytes),
                Frame::Malformed(Malformed::UnrecognizedError(bytes.to_vec()))
            );
        }
    }

    #[test]
    fn test_short_error_is_length_problem() {
        assert_eq!(
            Frame::parse(&[0x90, 0x60, 0xFF]),
            Frame::Malformed(Malformed::ErrorLength(vec![0x90, 0x60, 0xFF]))
        );
    }

    #[test]
    fn test_malformed_shapes() {
        assert!(matches!(
            Frame::parse(&[0x90, 0x41, 0x00, 0xFF]),
            Frame::Malformed(Malformed::Ack(_))
        ));
        assert!(matches!(
            Frame::parse(&[0x91, 0x41, 0xFF]),
            Frame::Malformed(Malformed::BadStartByte(_))
        ));
        assert!(matches!(
            Frame::parse(&[0x90, 0x71, 0xFF]),
            Frame::Malformed(Malformed::Unrecognized(_))
        ));
        assert!(matches!(
            Frame::parse(&[0xFF]),
            Frame::Malformed(Malformed::Unrecognized(_))
        ));
    }

    #[test]
    fn test_network_change() {
        for z in [0xF0, 0xA0, 0xB0, 0xD0] {
            assert_eq!(Frame::parse(&[z, 0x38, 0xFF]), Frame::NetworkChange);
        }
        assert!(matches!(
            Frame::parse(&[0xF1, 0x38, 0xFF]),
            Frame::Malformed(Malformed::BadStartByte(_))
        ));
    }

    #[test]
    fn test_hex_bytes_display() {
        assert_eq!(HexBytes(vec![0x90, 0x41, 0xFF]).to_string(), "[90 41 FF]");
        assert_eq!(HexBytes(vec![]).to_string(), "[]");
    }

    #[test]
    fn test_malformed_maps_to_desync() {
        let d: Desync = Malformed::Ack(vec![0x90, 0x41, 0x00, 0xFF]).into();
        assert!(d.to_string().contains("malformed ACK"));
        let d: Desync = Malformed::BadStartByte(vec![0x80, 0xFF]).into();
        assert!(d.to_string().contains("bad return start byte"));
    }
}
