use std::fmt;
use std::io;

use wirerpc_connection::ConnectionError;
use wirerpc_fury::FuryError;
use wirerpc_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const REMOTE_ERROR: i32 = 4;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Accept(source)
        | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidEndpoint(_) | TransportError::PathTooLong { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        TransportError::MessageTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn fury_error(context: &str, err: FuryError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn connection_error(context: &str, err: ConnectionError) -> CliError {
    match err {
        ConnectionError::Transport(err) => transport_error(context, err),
        ConnectionError::Fury(err) => fury_error(context, err),
        ConnectionError::Timeout { .. } => CliError::new(TIMEOUT, format!("{context}: {err}")),
        ConnectionError::MethodNotFound(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ConnectionError::Remote(_) => CliError::new(REMOTE_ERROR, format!("{context}: {err}")),
        ConnectionError::Json(_)
        | ConnectionError::InvalidUtf8(_)
        | ConnectionError::CodecMismatch { .. }
        | ConnectionError::Packet(_) => CliError::new(DATA_INVALID, format!("{context}: {err}")),
        ConnectionError::Disconnected | ConnectionError::Canceled(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use wirerpc_connection::revive_error;

    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = connection_error(
            "call failed",
            ConnectionError::Timeout {
                method: "slow".to_string(),
                after: Duration::from_secs(1),
            },
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("call failed: "));
    }

    #[test]
    fn remote_failures_keep_their_text() {
        let remote = revive_error(br#"{"name":"CustomError","message":"x","code":42}"#);
        let err = connection_error("call failed", ConnectionError::Remote(remote));
        assert_eq!(err.code, REMOTE_ERROR);
        assert_eq!(err.message, "call failed: CustomError: x");
    }

    #[test]
    fn refused_connections_are_failures() {
        let err = transport_error(
            "connect failed",
            TransportError::Connect {
                endpoint: "tcp://127.0.0.1:1".to_string(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
        );
        assert_eq!(err.code, FAILURE);
    }

    #[test]
    fn bad_endpoints_are_usage_errors() {
        let err = transport_error(
            "bind failed",
            TransportError::InvalidEndpoint("nowhere".to_string()),
        );
        assert_eq!(err.code, USAGE);
    }
}
