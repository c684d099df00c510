//! Frame kinds, payload codecs and response status codes.

use crate::error::{PacketError, Result};

/// Kind of frame, stored at header offset 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RpcType {
    /// Expects exactly one Response with the same request id.
    Request = 1,
    /// One-way message, never answered.
    Notification = 2,
    /// Answer to a Request; success or error depending on the status code.
    Response = 3,
    /// Asks the peer to cancel an in-flight Request.
    Cancel = 4,
}

impl RpcType {
    /// Returns a human-readable name for the frame kind.
    pub fn name(self) -> &'static str {
        match self {
            RpcType::Request => "REQUEST",
            RpcType::Notification => "NOTIFICATION",
            RpcType::Response => "RESPONSE",
            RpcType::Cancel => "CANCEL",
        }
    }
}

impl TryFrom<u8> for RpcType {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(RpcType::Request),
            2 => Ok(RpcType::Notification),
            3 => Ok(RpcType::Response),
            4 => Ok(RpcType::Cancel),
            other => Err(PacketError::UnknownRpcType(other)),
        }
    }
}

/// Payload encoding, stored at header offset 6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Codec {
    /// UTF-8 JSON text.
    #[default]
    Json = 0,
    /// Schema-driven compact binary.
    Fury = 1,
    /// UTF-8 string returned unparsed.
    Raw = 2,
}

impl Codec {
    /// Returns a human-readable name for the codec.
    pub fn name(self) -> &'static str {
        match self {
            Codec::Json => "json",
            Codec::Fury => "fury",
            Codec::Raw => "raw",
        }
    }

    /// Response bodies in this codec use a fixed `u32` length prefix
    /// instead of a varint.
    pub fn has_fixed_length_prefix(self) -> bool {
        matches!(self, Codec::Fury)
    }
}

impl TryFrom<u8> for Codec {
    type Error = PacketError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Codec::Json),
            1 => Ok(Codec::Fury),
            2 => Ok(Codec::Raw),
            other => Err(PacketError::UnknownCodec(other)),
        }
    }
}

/// Response status: success.
pub const STATUS_OK: u16 = 0;

/// Response status: the handler returned an error or panicked.
pub const EXEC_ERROR: u16 = 1;

/// Response status: no handler is registered for the method.
pub const METHOD_NOT_FOUND: u16 = 2;

/// Returns a human-readable name for a response status code.
pub fn status_name(code: u16) -> &'static str {
    match code {
        STATUS_OK => "OK",
        EXEC_ERROR => "EXEC_ERROR",
        METHOD_NOT_FOUND => "METHOD_NOT_FOUND",
        _ => "UNKNOWN",
    }
}
