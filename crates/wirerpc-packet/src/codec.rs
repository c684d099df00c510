use bytes::{BufMut, Bytes, BytesMut};

use crate::error::Result;
use crate::reader::BinaryReader;
use crate::rpc_type::{Codec, RpcType, STATUS_OK};
use crate::writer::{put_var_u32, wire_len};

/// Header: reserved (1) + rpc type (1) + request id (4) + codec (1) = 7 bytes.
pub const HEADER_SIZE: usize = 7;

/// Value written into the reserved header byte.
pub const PROTOCOL_VERSION: u8 = 1;

/// Common frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub rpc_type: RpcType,
    pub request_id: u32,
    pub codec: Codec,
}

/// A fully decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Request {
        request_id: u32,
        codec: Codec,
        method: String,
        content: Bytes,
    },
    Notification {
        request_id: u32,
        codec: Codec,
        method: String,
        content: Bytes,
    },
    /// `status == STATUS_OK` carries the result in `codec`; any other status
    /// carries a JSON error envelope.
    Response {
        request_id: u32,
        codec: Codec,
        status: u16,
        content: Bytes,
    },
    Cancel {
        request_id: u32,
    },
}

impl Packet {
    pub fn request_id(&self) -> u32 {
        match self {
            Packet::Request { request_id, .. }
            | Packet::Notification { request_id, .. }
            | Packet::Response { request_id, .. }
            | Packet::Cancel { request_id } => *request_id,
        }
    }

    pub fn rpc_type(&self) -> RpcType {
        match self {
            Packet::Request { .. } => RpcType::Request,
            Packet::Notification { .. } => RpcType::Notification,
            Packet::Response { .. } => RpcType::Response,
            Packet::Cancel { .. } => RpcType::Cancel,
        }
    }
}

fn put_header(dst: &mut BytesMut, rpc_type: RpcType, request_id: u32, codec: Codec) {
    dst.put_u8(PROTOCOL_VERSION);
    dst.put_u8(rpc_type as u8);
    dst.put_u32_le(request_id);
    dst.put_u8(codec as u8);
}

fn put_call(
    dst: &mut BytesMut,
    rpc_type: RpcType,
    request_id: u32,
    codec: Codec,
    method: &str,
    content: &[u8],
) -> Result<()> {
    let method_len = wire_len(method.len())?;
    let content_len = wire_len(content.len())?;

    dst.reserve(HEADER_SIZE + 5 + method.len() + 4 + content.len());
    put_header(dst, rpc_type, request_id, codec);
    put_var_u32(dst, method_len);
    dst.put_slice(method.as_bytes());
    dst.put_u32_le(content_len);
    dst.put_slice(content);
    Ok(())
}

/// Encode a Request frame.
///
/// Wire format:
/// ```text
/// ┌──────────┬─────────┬───────────┬───────┬─────────────┬────────┬────────────┬─────────┐
/// │ reserved │ rpcType │ requestId │ codec │ methodLen   │ method │ contentLen │ content │
/// │ (1B)     │ (1B)    │ (4B LE)   │ (1B)  │ (varint32)  │ utf8   │ (4B LE)    │         │
/// └──────────┴─────────┴───────────┴───────┴─────────────┴────────┴────────────┴─────────┘
/// ```
pub fn encode_request(
    request_id: u32,
    codec: Codec,
    method: &str,
    content: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    put_call(dst, RpcType::Request, request_id, codec, method, content)
}

/// Encode a Notification frame. Same body layout as a Request.
pub fn encode_notification(
    request_id: u32,
    codec: Codec,
    method: &str,
    content: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    put_call(dst, RpcType::Notification, request_id, codec, method, content)
}

/// Encode a successful Response frame.
///
/// Fury content gets a `u32` length prefix, JSON and raw strings a varint.
pub fn encode_response(
    request_id: u32,
    codec: Codec,
    content: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let content_len = wire_len(content.len())?;

    dst.reserve(HEADER_SIZE + 2 + 5 + content.len());
    put_header(dst, RpcType::Response, request_id, codec);
    dst.put_u16_le(STATUS_OK);
    if codec.has_fixed_length_prefix() {
        dst.put_u32_le(content_len);
    } else {
        put_var_u32(dst, content_len);
    }
    dst.put_slice(content);
    Ok(())
}

/// Encode an error Response frame. Error bodies are always JSON.
pub fn encode_error(
    request_id: u32,
    status: u16,
    error_json: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    debug_assert_ne!(status, STATUS_OK, "error frames need a non-zero status");
    let content_len = wire_len(error_json.len())?;

    dst.reserve(HEADER_SIZE + 2 + 5 + error_json.len());
    put_header(dst, RpcType::Response, request_id, Codec::Json);
    dst.put_u16_le(status);
    put_var_u32(dst, content_len);
    dst.put_slice(error_json);
    Ok(())
}

/// Encode a Cancel frame for an in-flight request. Header only.
pub fn encode_cancel(request_id: u32, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    put_header(dst, RpcType::Cancel, request_id, Codec::Json);
}

/// Read the common header, skipping the reserved byte.
pub fn read_header(reader: &mut BinaryReader) -> Result<Header> {
    reader.skip(1)?;
    let rpc_type = RpcType::try_from(reader.u8()?)?;
    let request_id = reader.u32()?;
    let codec = Codec::try_from(reader.u8()?)?;
    Ok(Header {
        rpc_type,
        request_id,
        codec,
    })
}

/// Decode the frame the reader currently points at.
pub fn decode_packet(reader: &mut BinaryReader) -> Result<Packet> {
    let Header {
        rpc_type,
        request_id,
        codec,
    } = read_header(reader)?;

    let packet = match rpc_type {
        RpcType::Request | RpcType::Notification => {
            let method = reader.string_of_var_u32()?;
            let content = reader.bytes_of_u32()?;
            if rpc_type == RpcType::Request {
                Packet::Request {
                    request_id,
                    codec,
                    method,
                    content,
                }
            } else {
                Packet::Notification {
                    request_id,
                    codec,
                    method,
                    content,
                }
            }
        }
        RpcType::Response => {
            let status = reader.u16()?;
            let content = if status == STATUS_OK && codec.has_fixed_length_prefix() {
                reader.bytes_of_u32()?
            } else {
                reader.bytes_of_var_u32()?
            };
            Packet::Response {
                request_id,
                codec,
                status,
                content,
            }
        }
        RpcType::Cancel => Packet::Cancel { request_id },
    };

    tracing::trace!(
        rpc_type = rpc_type.name(),
        request_id,
        codec = codec.name(),
        "decoded packet"
    );
    Ok(packet)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PacketError;
    use crate::rpc_type::{EXEC_ERROR, METHOD_NOT_FOUND};

    fn decode(bytes: Bytes) -> Result<Packet> {
        let mut reader = BinaryReader::new();
        reader.reset(bytes);
        decode_packet(&mut reader)
    }

    #[test]
    fn request_wire_layout() {
        let mut buf = BytesMut::new();
        encode_request(7, Codec::Json, "add", b"[1,2]", &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[
                1, 1, 7, 0, 0, 0, 0, // header
                3, b'a', b'd', b'd', // method
                5, 0, 0, 0, b'[', b'1', b',', b'2', b']', // content
            ]
        );
    }

    #[test]
    fn decode_request() {
        let mut buf = BytesMut::new();
        encode_request(42, Codec::Fury, "shortUrl", &[0xde, 0xad], &mut buf).unwrap();

        let packet = decode(buf.freeze()).unwrap();
        assert_eq!(
            packet,
            Packet::Request {
                request_id: 42,
                codec: Codec::Fury,
                method: "shortUrl".to_string(),
                content: Bytes::from_static(&[0xde, 0xad]),
            }
        );
        assert_eq!(packet.rpc_type(), RpcType::Request);
    }

    #[test]
    fn decode_notification() {
        let mut buf = BytesMut::new();
        encode_notification(3, Codec::Raw, "onDidChange", b"x", &mut buf).unwrap();

        let packet = decode(buf.freeze()).unwrap();
        assert!(matches!(
            packet,
            Packet::Notification { ref method, codec: Codec::Raw, .. } if method == "onDidChange"
        ));
        assert_eq!(packet.request_id(), 3);
    }

    #[test]
    fn fury_response_uses_u32_prefix() {
        let mut buf = BytesMut::new();
        encode_response(9, Codec::Fury, b"abc", &mut buf).unwrap();

        assert_eq!(
            buf.as_ref(),
            &[1, 3, 9, 0, 0, 0, 1, 0, 0, 3, 0, 0, 0, b'a', b'b', b'c']
        );
        let packet = decode(buf.freeze()).unwrap();
        assert!(matches!(
            packet,
            Packet::Response { status: 0, codec: Codec::Fury, ref content, .. } if content.as_ref() == b"abc"
        ));
    }

    #[test]
    fn json_response_uses_varint_prefix() {
        let mut buf = BytesMut::new();
        encode_response(9, Codec::Json, b"3", &mut buf).unwrap();

        assert_eq!(buf.as_ref(), &[1, 3, 9, 0, 0, 0, 0, 0, 0, 1, b'3']);
        let packet = decode(buf.freeze()).unwrap();
        assert!(matches!(
            packet,
            Packet::Response { status: 0, codec: Codec::Json, ref content, .. } if content.as_ref() == b"3"
        ));
    }

    #[test]
    fn raw_response_roundtrip() {
        let mut buf = BytesMut::new();
        encode_response(1, Codec::Raw, "plain text".as_bytes(), &mut buf).unwrap();

        let packet = decode(buf.freeze()).unwrap();
        assert!(matches!(
            packet,
            Packet::Response { codec: Codec::Raw, ref content, .. } if content.as_ref() == b"plain text"
        ));
    }

    #[test]
    fn error_response_is_json_with_status() {
        let body = br#"{"name":"Error","message":"boom"}"#;
        let mut buf = BytesMut::new();
        encode_error(5, EXEC_ERROR, body, &mut buf).unwrap();

        assert_eq!(buf[6], Codec::Json as u8);
        let packet = decode(buf.freeze()).unwrap();
        match packet {
            Packet::Response {
                request_id,
                codec,
                status,
                content,
            } => {
                assert_eq!(request_id, 5);
                assert_eq!(codec, Codec::Json);
                assert_eq!(status, EXEC_ERROR);
                assert_eq!(content.as_ref(), body);
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }

    #[test]
    fn method_not_found_status_roundtrip() {
        let mut buf = BytesMut::new();
        encode_error(6, METHOD_NOT_FOUND, b"{}", &mut buf).unwrap();
        let packet = decode(buf.freeze()).unwrap();
        assert!(matches!(
            packet,
            Packet::Response {
                status: METHOD_NOT_FOUND,
                ..
            }
        ));
    }

    #[test]
    fn cancel_is_header_only() {
        let mut buf = BytesMut::new();
        encode_cancel(0xAABB_CCDD, &mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);

        let packet = decode(buf.freeze()).unwrap();
        assert_eq!(
            packet,
            Packet::Cancel {
                request_id: 0xAABB_CCDD
            }
        );
    }

    #[test]
    fn reserved_byte_is_ignored() {
        let mut buf = BytesMut::new();
        encode_cancel(1, &mut buf);
        buf[0] = 0xff;
        assert!(decode(buf.freeze()).is_ok());
    }

    #[test]
    fn unknown_rpc_type_rejected() {
        let bytes = Bytes::from_static(&[1, 9, 0, 0, 0, 0, 0]);
        assert!(matches!(
            decode(bytes),
            Err(PacketError::UnknownRpcType(9))
        ));
    }

    #[test]
    fn unknown_codec_rejected() {
        let bytes = Bytes::from_static(&[1, 1, 0, 0, 0, 0, 7]);
        assert!(matches!(decode(bytes), Err(PacketError::UnknownCodec(7))));
    }

    #[test]
    fn truncated_content_rejected() {
        let mut buf = BytesMut::new();
        encode_request(1, Codec::Json, "m", b"payload", &mut buf).unwrap();
        buf.truncate(buf.len() - 3);

        assert!(matches!(
            decode(buf.freeze()),
            Err(PacketError::Truncated { .. })
        ));
    }

    #[test]
    fn reader_reused_across_messages() {
        let mut first = BytesMut::new();
        encode_request(1, Codec::Json, "a", b"1", &mut first).unwrap();
        let mut second = BytesMut::new();
        encode_cancel(2, &mut second);

        let mut reader = BinaryReader::new();
        reader.reset(first.freeze());
        assert_eq!(decode_packet(&mut reader).unwrap().request_id(), 1);
        reader.reset(second.freeze());
        assert_eq!(decode_packet(&mut reader).unwrap().request_id(), 2);
    }
}
