//! Byte-stream framing
//!
//! Splits the inbound stream at each `0xFF` terminator and classifies the
//! run as a [`Frame`]. Outbound messages are already terminated, so encoding
//! is a plain copy.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use super::frame::{Frame, HexBytes, Malformed, TERMINATOR};
use super::MAX_MESSAGE_LEN;

/// Codec for VISCA messages on a byte stream
#[derive(Debug, Clone)]
pub struct ViscaCodec {
    max_frame_len: usize,
}

impl ViscaCodec {
    /// Codec that gives up on runs of `max_frame_len` bytes with no terminator
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for ViscaCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_LEN)
    }
}

impl Decoder for ViscaCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, io::Error> {
        match src.iter().position(|&b| b == TERMINATOR) {
            Some(end) => {
                let raw = src.split_to(end + 1);
                let frame = Frame::parse(&raw);
                trace!(frame = %HexBytes::from(&raw[..]), kind = frame.kind(), "RX VISCA");
                Ok(Some(frame))
            }
            None if src.len() >= self.max_frame_len => {
                // Framing is lost; hand the condition up instead of guessing.
                let len = src.len();
                src.clear();
                Ok(Some(Frame::Malformed(Malformed::Oversized(len))))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Vec<u8>> for ViscaCodec {
    type Error = io::Error;

    fn encode(&mut self, message: Vec<u8>, dst: &mut BytesMut) -> Result<(), io::Error> {
        trace!(frame = %HexBytes::from(&message[..]), "TX VISCA");
        dst.reserve(message.len());
        dst.put_slice(&message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::frame::ErrorReply;

    #[test]
    fn test_split_back_to_back_frames() {
        let mut codec = ViscaCodec::default();
        let mut buf = BytesMut::from(&[0x90, 0x41, 0xFF, 0x90, 0x51, 0xFF, 0x90][..]);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Ack { socket: 1 }));
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Completion { socket: 1 })
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], &[0x90]);
    }

    #[test]
    fn test_partial_frame_waits() {
        let mut codec = ViscaCodec::default();
        let mut buf = BytesMut::from(&[0x90, 0x60][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);

        buf.extend_from_slice(&[0x03, 0xFF]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Error(ErrorReply::BufferFull))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_oversized_run_is_reported() {
        let mut codec = ViscaCodec::new(4);
        let mut buf = BytesMut::from(&[0x90, 0x50, 0x01, 0x02][..]);
        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::Malformed(Malformed::Oversized(4)))
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_encode_copies_bytes() {
        let mut codec = ViscaCodec::default();
        let mut dst = BytesMut::new();
        codec
            .encode(vec![0x81, 0x01, 0x06, 0x04, 0xFF], &mut dst)
            .unwrap();
        assert_eq!(&dst[..], &[0x81, 0x01, 0x06, 0x04, 0xFF]);
    }
}
