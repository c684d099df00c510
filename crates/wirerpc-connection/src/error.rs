use std::time::Duration;

use crate::error_like::RemoteError;

/// Errors that can occur on a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] wirerpc_transport::TransportError),

    /// Malformed or unknown frame.
    #[error("packet error: {0}")]
    Packet(#[from] wirerpc_packet::PacketError),

    /// Fury encode/decode error.
    #[error("fury error: {0}")]
    Fury(#[from] wirerpc_fury::FuryError),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload text was not valid UTF-8.
    #[error("invalid utf-8 payload: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// The remote handler failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The peer has no handler for the method.
    #[error("method '{0}' not found on peer")]
    MethodNotFound(String),

    /// No response arrived within the configured timeout.
    #[error("request '{method}' timed out after {after:?}")]
    Timeout { method: String, after: Duration },

    /// The caller canceled the request.
    #[error("request '{0}' canceled")]
    Canceled(String),

    /// The inbound side of the channel ended.
    #[error("connection closed")]
    Disconnected,

    /// `listen` was already called on this connection.
    #[error("connection is already listening")]
    AlreadyListening,

    /// A response arrived for a request id that is not pending.
    #[error("response for unknown request {0}")]
    UnknownRequest(u32),

    /// A payload was not in the codec the operation needs.
    #[error("expected {expected} payload, got {found}")]
    CodecMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, ConnectionError>;
