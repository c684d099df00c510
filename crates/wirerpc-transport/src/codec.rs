use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::{Result, TransportError};

/// Stream message header: magic (2) + length (4) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Magic bytes: "WR" (0x57 0x52).
pub const MAGIC: [u8; 2] = [0x57, 0x52];

/// Default maximum message size: 16 MiB.
pub const DEFAULT_MAX_MESSAGE: usize = 16 * 1024 * 1024;

/// Configuration for the stream message codec.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    /// Maximum message size in bytes. Default: 16 MiB.
    pub max_message_size: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE,
        }
    }
}

impl CodecConfig {
    pub fn with_max_message_size(mut self, max: usize) -> Self {
        self.max_message_size = max;
        self
    }
}

/// Delimits whole messages on a byte stream.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬─────────────────┐
/// │ Magic (2B)   │ Length    │ Message         │
/// │ 0x57 0x52    │ (4B LE)   │ (Length bytes)  │
/// │ "WR"         │           │                 │
/// └──────────────┴───────────┴─────────────────┘
/// ```
#[derive(Debug, Clone, Default)]
pub struct MessageCodec {
    config: CodecConfig,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: CodecConfig) -> Self {
        Self { config }
    }

    pub fn max_message_size(&self) -> usize {
        self.config.max_message_size
    }
}

impl Decoder for MessageCodec {
    type Item = Bytes;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        if src[0..2] != MAGIC {
            return Err(TransportError::InvalidMagic);
        }

        let len = u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize;
        if len > self.config.max_message_size {
            return Err(TransportError::MessageTooLarge {
                size: len,
                max: self.config.max_message_size,
            });
        }

        let total = HEADER_SIZE + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        Ok(Some(src.split_to(len).freeze()))
    }
}

impl Encoder<Bytes> for MessageCodec {
    type Error = TransportError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        let max = self.config.max_message_size.min(u32::MAX as usize);
        if item.len() > max {
            return Err(TransportError::MessageTooLarge {
                size: item.len(),
                max,
            });
        }
        dst.reserve(HEADER_SIZE + item.len());
        dst.put_slice(&MAGIC);
        dst.put_u32_le(item.len() as u32);
        dst.put_slice(&item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"abc"), &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x57, 0x52, 3, 0, 0, 0, b'a', b'b', b'c']);
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&[0x57, 0x52, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_message() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&[0x57, 0x52, 4, 0, 0, 0, b'x'][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(b"yzw");
        let message = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(message.as_ref(), b"xyzw");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_two_messages_in_one_read() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"one"), &mut buf).unwrap();
        codec.encode(Bytes::from_static(b""), &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap().unwrap().as_ref(), b"one");
        assert!(codec.decode(&mut buf).unwrap().unwrap().is_empty());
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_decode_invalid_magic() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&[0x49, 0x50, 0, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::InvalidMagic)
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let mut codec = MessageCodec::with_config(CodecConfig::default().with_max_message_size(8));
        let mut buf = BytesMut::from(&[0x57, 0x52, 9, 0, 0, 0][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(TransportError::MessageTooLarge { size: 9, max: 8 })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_message() {
        let mut codec = MessageCodec::with_config(CodecConfig::default().with_max_message_size(2));
        let mut buf = BytesMut::new();
        let err = codec
            .encode(Bytes::from_static(b"abc"), &mut buf)
            .unwrap_err();
        assert!(matches!(err, TransportError::MessageTooLarge { size: 3, .. }));
        assert!(buf.is_empty());
    }
}
