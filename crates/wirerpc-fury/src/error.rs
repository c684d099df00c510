use wirerpc_packet::PacketError;

/// Errors that can occur while encoding or decoding Fury payloads.
#[derive(Debug, thiserror::Error)]
pub enum FuryError {
    /// A value does not have the shape its descriptor requires.
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: &'static str },

    /// A number does not fit the integer width of its descriptor.
    #[error("value {value} out of range for {ty}")]
    OutOfRange { ty: &'static str, value: String },

    /// An object value lacks a non-nullable field.
    #[error("missing field '{0}'")]
    MissingField(String),

    /// More arguments were passed than the method declares.
    #[error("method '{method}' takes {expected} argument(s), got {found}")]
    ArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },

    /// The bytes decoded but do not form a valid value.
    #[error("invalid fury data: {0}")]
    InvalidData(String),

    /// Reading the underlying bytes failed.
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// An `any` value could not be converted to or from JSON text.
    #[error("invalid JSON in fury payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A protocol descriptor could not be loaded.
    #[error("failed to load protocol: {0}")]
    LoadFailed(String),
}

pub type Result<T> = std::result::Result<T, FuryError>;
