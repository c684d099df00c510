//! RPC frame layout for wirerpc.
//!
//! Every frame starts with a 7-byte header:
//! - 1 reserved byte (protocol version, ignored on read)
//! - 1 byte rpc type (request, notification, response, cancel)
//! - a 4-byte little-endian request id
//! - 1 byte payload codec (JSON, Fury, raw string)
//!
//! Encoding is done by pure functions writing into a `BytesMut`. Decoding goes
//! through a [`BinaryReader`] that is reset for every inbound message and read
//! strictly in write order.

pub mod codec;
pub mod error;
pub mod reader;
pub mod rpc_type;
pub mod writer;

pub use codec::{
    decode_packet, encode_cancel, encode_error, encode_notification, encode_request,
    encode_response, read_header, Header, Packet, HEADER_SIZE, PROTOCOL_VERSION,
};
pub use error::{PacketError, Result};
pub use reader::BinaryReader;
pub use rpc_type::{status_name, Codec, RpcType, EXEC_ERROR, METHOD_NOT_FOUND, STATUS_OK};
pub use writer::BinaryWriter;
