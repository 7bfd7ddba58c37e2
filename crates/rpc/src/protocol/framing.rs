//! Message framing for the wire protocol.
//!
//! ```text
//! +----------------+------+----------------+-----------------+
//! | length (u32 BE)| type | crc32 (u32 BE) | payload (length)|
//! +----------------+------+----------------+-----------------+
//! ```
//!
//! A zero checksum means the payload is unchecked.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Error, ProtocolError, Result};

/// Maximum frame size (10MB by default).
pub const MAX_FRAME_SIZE: usize = 10 * 1024 * 1024;

/// Frame header size (4 bytes length + 1 byte type + 4 bytes checksum).
pub const FRAME_HEADER_SIZE: usize = 9;

/// Type of frame being sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    /// Carries a `RequestEnvelope`.
    Request = 0x01,
    /// Carries a `ResponseEnvelope`.
    Response = 0x02,
    /// Keep-alive; echoed by the server.
    Heartbeat = 0x03,
    /// Orderly end of the connection.
    Close = 0x04,
}

impl TryFrom<u8> for FrameType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> std::result::Result<Self, ProtocolError> {
        match value {
            0x01 => Ok(Self::Request),
            0x02 => Ok(Self::Response),
            0x03 => Ok(Self::Heartbeat),
            0x04 => Ok(Self::Close),
            _ => Err(ProtocolError::InvalidFrame(format!(
                "Unknown frame type: {value:#x}"
            ))),
        }
    }
}

/// A frame in the wire protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Type of this frame.
    pub frame_type: FrameType,
    /// Frame payload.
    pub payload: Bytes,
    /// Optional checksum for integrity.
    pub checksum: Option<u32>,
}

impl Frame {
    /// Create a new checksummed frame.
    #[must_use]
    pub fn new(frame_type: FrameType, payload: Bytes) -> Self {
        let checksum = Some(crc32fast::hash(&payload));
        Self {
            frame_type,
            payload,
            checksum,
        }
    }

    /// Create a frame without checksum.
    #[must_use]
    pub const fn new_unchecked(frame_type: FrameType, payload: Bytes) -> Self {
        Self {
            frame_type,
            payload,
            checksum: None,
        }
    }

    /// An empty heartbeat frame.
    #[must_use]
    pub const fn heartbeat() -> Self {
        Self::new_unchecked(FrameType::Heartbeat, Bytes::new())
    }

    /// An empty close frame.
    #[must_use]
    pub const fn close() -> Self {
        Self::new_unchecked(FrameType::Close, Bytes::new())
    }

    /// Verify the checksum if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the checksum is invalid.
    pub fn verify_checksum(&self) -> Result<()> {
        if let Some(expected) = self.checksum {
            let actual = crc32fast::hash(&self.payload);
            if expected != actual {
                return Err(ProtocolError::ChecksumMismatch { expected, actual }.into());
            }
        }
        Ok(())
    }
}

/// Codec for encoding/decoding frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
    verify_checksum: bool,
}

impl FrameCodec {
    /// Create a new frame codec.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            verify_checksum: true,
        }
    }

    /// Create a codec with custom max frame size.
    #[must_use]
    pub const fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Disable checksum verification.
    #[must_use]
    pub const fn without_checksum_verification(mut self) -> Self {
        self.verify_checksum = false;
        self
    }

    fn check_size(&self, size: usize) -> Result<()> {
        if size > self.max_frame_size {
            return Err(Error::Protocol(ProtocolError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            }));
        }
        Ok(())
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header; nothing is consumed until the whole frame is here.
        let mut header = &buf[..FRAME_HEADER_SIZE];
        let payload_len = header.get_u32() as usize;
        let frame_type_byte = header.get_u8();
        let checksum = header.get_u32();

        self.check_size(payload_len)?;

        let frame_len = FRAME_HEADER_SIZE + payload_len;
        if buf.len() < frame_len {
            buf.reserve(frame_len - buf.len());
            return Ok(None);
        }

        let frame_type = FrameType::try_from(frame_type_byte)?;

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();

        let frame = Frame {
            frame_type,
            payload,
            checksum: (checksum != 0).then_some(checksum),
        };

        if self.verify_checksum {
            frame.verify_checksum()?;
        }

        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, frame: Frame, buf: &mut BytesMut) -> Result<()> {
        let payload_len = frame.payload.len();
        self.check_size(payload_len)?;

        buf.reserve(FRAME_HEADER_SIZE + payload_len);

        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(payload_len as u32);
        buf.put_u8(frame.frame_type as u8);
        buf.put_u32(frame.checksum.unwrap_or(0));
        buf.put(frame.payload);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn encoded(frame: Frame) -> BytesMut {
        let mut buf = BytesMut::new();
        FrameCodec::new().encode(frame, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut codec = FrameCodec::new();
        let frame = Frame::new(FrameType::Request, Bytes::from("Hello, World!"));
        let mut buf = encoded(frame.clone());

        let decoded = codec.decode(&mut buf).unwrap().unwrap();

        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        buf.put_u32(100);
        buf.put_u8(FrameType::Request as u8);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn test_checksum_verification() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        let payload = b"Hello, World!";
        #[allow(clippy::cast_possible_truncation)]
        buf.put_u32(payload.len() as u32);
        buf.put_u8(FrameType::Request as u8);
        buf.put_u32(12345);
        buf.put_slice(payload);

        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_checksum_verification_disabled() {
        let mut codec = FrameCodec::new().without_checksum_verification();
        let mut buf = encoded(Frame::new(FrameType::Response, Bytes::from("abc")));
        buf[FRAME_HEADER_SIZE] = b'x';

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.payload, Bytes::from("xbc"));
    }

    #[test]
    fn test_unchecked_frame_passes() {
        let mut codec = FrameCodec::new();
        let mut buf = encoded(Frame::heartbeat());

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.frame_type, FrameType::Heartbeat);
        assert_eq!(frame.checksum, None);
    }

    #[test]
    fn test_oversize_frame_rejected() {
        let mut codec = FrameCodec::new().with_max_frame_size(8);
        let mut buf = BytesMut::new();
        buf.put_u32(9);
        buf.put_u8(FrameType::Request as u8);
        buf.put_u32(0);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Protocol(ProtocolError::FrameTooLarge { size: 9, max: 8 }))
        ));

        let frame = Frame::new(FrameType::Request, Bytes::from(vec![0; 9]));
        assert!(codec.encode(frame, &mut BytesMut::new()).is_err());
    }

    #[test]
    fn test_unknown_frame_type() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(0);
        buf.put_u8(0x7f);
        buf.put_u32(0);

        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::Protocol(ProtocolError::InvalidFrame(_)))
        ));
    }

    proptest! {
        #[test]
        fn test_split_reads_reassemble(
            first in proptest::collection::vec(any::<u8>(), 0..256),
            second in proptest::collection::vec(any::<u8>(), 0..256),
            chunk in 1usize..32,
        ) {
            let mut wire = encoded(Frame::new(FrameType::Request, Bytes::from(first.clone())));
            wire.extend_from_slice(&encoded(Frame::new(FrameType::Response, Bytes::from(second.clone()))));

            let mut codec = FrameCodec::new();
            let mut buf = BytesMut::new();
            let mut frames = Vec::new();

            for piece in wire.chunks(chunk) {
                buf.extend_from_slice(piece);
                while let Some(frame) = codec.decode(&mut buf).unwrap() {
                    frames.push(frame);
                }
            }

            prop_assert_eq!(frames.len(), 2);
            prop_assert_eq!(&frames[0].payload[..], &first[..]);
            prop_assert_eq!(&frames[1].payload[..], &second[..]);
            prop_assert_eq!(frames[1].frame_type, FrameType::Response);
        }
    }
}
