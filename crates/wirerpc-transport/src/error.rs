/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The other side of the channel is gone.
    #[error("transport closed")]
    Closed,

    /// An I/O error occurred on the underlying stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stream message header contains an invalid magic number.
    #[error("invalid message magic (expected 0x5752 \"WR\")")]
    InvalidMagic,

    /// A message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// The endpoint string could not be understood.
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    /// A Unix socket path exceeds the platform limit.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: std::path::PathBuf,
        len: usize,
        max: usize,
    },

    /// Failed to bind to the endpoint.
    #[error("failed to bind to {endpoint}: {source}")]
    Bind {
        endpoint: String,
        source: std::io::Error,
    },

    /// Failed to connect to the endpoint.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
