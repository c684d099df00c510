use std::any::Any;
use std::fmt;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConnectionError;
use crate::registry::ServiceError;

/// Error name used for "no such method" failures.
pub const METHOD_NOT_FOUND_ERROR: &str = "MethodNotFoundError";

/// An error as it travels on the wire.
///
/// Serialized as one flat JSON object: `name`, `message`, an optional `stack`,
/// and every extra field next to them, so `{"name": "CustomError",
/// "message": "x", "code": 42}` keeps its `code` on the other side.
///
/// Any `std::error::Error` converts into an envelope, which lets request
/// handlers use `?` directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_name() -> String {
    "Error".to_string()
}

impl ErrorEnvelope {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
            extra: Map::new(),
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Attach an extra field. The reserved keys `name`, `message` and
    /// `stack` are ignored.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if !matches!(key.as_str(), "name" | "message" | "stack") {
            self.extra.insert(key, value.into());
        }
        self
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(METHOD_NOT_FOUND_ERROR, format!("method '{method}' not found"))
    }

    pub fn is_method_not_found(&self) -> bool {
        self.name == METHOD_NOT_FOUND_ERROR
    }

    /// Capture a native error: its display text becomes the message and its
    /// `source()` chain becomes the stack.
    ///
    /// A [`RemoteError`], a remote [`ConnectionError`] or a failed
    /// [`ServiceError`] is unwrapped back into its original envelope, so
    /// relayed failures keep their name and fields.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        Self::from_error_named(err, "Error")
    }

    fn from_error_named(err: &(dyn std::error::Error + 'static), name: &str) -> Self {
        if let Some(remote) = err.downcast_ref::<RemoteError>() {
            return remote.envelope().clone();
        }
        if let Some(service) = err.downcast_ref::<ServiceError>() {
            return service.to_envelope();
        }
        if let Some(ConnectionError::Remote(remote)) = err.downcast_ref::<ConnectionError>() {
            return remote.envelope().clone();
        }

        let mut envelope = Self::new(name, err.to_string());
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }
        if !chain.is_empty() {
            envelope.stack = Some(chain.join("\n"));
        }
        envelope
    }

    /// Describe a caught panic.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::new("PanicError", format!("handler panicked: {detail}"))
    }

    /// Serialize to JSON bytes.
    pub fn to_json(&self) -> Bytes {
        // Serializing a struct of strings and JSON values cannot fail.
        serde_json::to_vec(self)
            .map(Bytes::from)
            .unwrap_or_else(|_| Bytes::from_static(br#"{"name":"Error","message":""}"#))
    }
}

impl fmt::Display for ErrorEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl<E> From<E> for ErrorEnvelope
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn from(err: E) -> Self {
        let name = std::any::type_name::<E>()
            .rsplit("::")
            .next()
            .unwrap_or("Error");
        Self::from_error_named(&err, name)
    }
}

/// A failure reported by the peer, revived from its [`ErrorEnvelope`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}: {}", .envelope.name, .envelope.message)]
pub struct RemoteError {
    envelope: ErrorEnvelope,
}

impl RemoteError {
    pub fn name(&self) -> &str {
        &self.envelope.name
    }

    pub fn message(&self) -> &str {
        &self.envelope.message
    }

    pub fn stack(&self) -> Option<&str> {
        self.envelope.stack.as_deref()
    }

    /// Look up an extra field carried by the error.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.envelope.extra.get(key)
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.envelope.extra
    }

    pub fn envelope(&self) -> &ErrorEnvelope {
        &self.envelope
    }

    pub fn into_envelope(self) -> ErrorEnvelope {
        self.envelope
    }
}

impl From<ErrorEnvelope> for RemoteError {
    fn from(envelope: ErrorEnvelope) -> Self {
        Self { envelope }
    }
}

/// Rebuild a native error from the JSON body of an error frame.
///
/// Bodies that are not an error object still produce an error, with the raw
/// text as its message.
pub fn revive_error(content: &[u8]) -> RemoteError {
    let envelope = match serde_json::from_slice::<Value>(content) {
        Ok(Value::Object(map)) => serde_json::from_value(Value::Object(map))
            .unwrap_or_else(|_| ErrorEnvelope::new("Error", String::from_utf8_lossy(content))),
        Ok(Value::String(message)) => ErrorEnvelope::new("Error", message),
        _ => ErrorEnvelope::new("Error", String::from_utf8_lossy(content)),
    };
    RemoteError { envelope }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("disk unavailable")]
    struct DiskError {
        #[source]
        source: std::io::Error,
    }

    #[test]
    fn envelope_serializes_flat() {
        let envelope = ErrorEnvelope::new("CustomError", "x")
            .with_stack("at handler")
            .with_extra("code", 42);
        let value: Value = serde_json::from_slice(&envelope.to_json()).unwrap();
        assert_eq!(
            value,
            json!({"name": "CustomError", "message": "x", "stack": "at handler", "code": 42})
        );
    }

    #[test]
    fn reserved_keys_are_not_extra() {
        let envelope = ErrorEnvelope::new("E", "m").with_extra("message", "other");
        assert!(envelope.extra.is_empty());
        assert_eq!(envelope.message, "m");
    }

    #[test]
    fn revive_keeps_every_field() {
        let revived = revive_error(
            br#"{"name":"CustomError","message":"x","stack":"s","code":42,"data":{"k":[1]}}"#,
        );
        assert_eq!(revived.name(), "CustomError");
        assert_eq!(revived.message(), "x");
        assert_eq!(revived.stack(), Some("s"));
        assert_eq!(revived.get("code"), Some(&json!(42)));
        assert_eq!(revived.get("data"), Some(&json!({"k": [1]})));
        assert_eq!(revived.to_string(), "CustomError: x");

        let as_std: &dyn std::error::Error = &revived;
        assert_eq!(as_std.to_string(), "CustomError: x");
    }

    #[test]
    fn revive_tolerates_odd_bodies() {
        assert_eq!(revive_error(b"not json").message(), "not json");
        assert_eq!(revive_error(br#""plain""#).message(), "plain");

        let minimal = revive_error(br#"{"message":"only"}"#);
        assert_eq!(minimal.name(), "Error");
        assert_eq!(minimal.stack(), None);
    }

    #[test]
    fn native_errors_convert_with_type_name_and_chain() {
        let err = DiskError {
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such device"),
        };
        let envelope = ErrorEnvelope::from(err);
        assert_eq!(envelope.name, "DiskError");
        assert_eq!(envelope.message, "disk unavailable");
        assert_eq!(envelope.stack.as_deref(), Some("caused by: no such device"));
    }

    #[test]
    fn remote_error_converts_back_losslessly() {
        let remote = revive_error(br#"{"name":"CustomError","message":"x","code":42}"#);
        let envelope = ErrorEnvelope::from(remote.clone());
        assert_eq!(&envelope, remote.envelope());
    }

    #[test]
    fn panic_payloads_are_described() {
        let envelope = ErrorEnvelope::from_panic(&"boom");
        assert_eq!(envelope.name, "PanicError");
        assert!(envelope.message.contains("boom"));

        let envelope = ErrorEnvelope::from_panic(&String::from("owned boom"));
        assert!(envelope.message.contains("owned boom"));
    }

    #[test]
    fn method_not_found_is_recognizable() {
        let envelope = ErrorEnvelope::method_not_found("missing");
        assert!(envelope.is_method_not_found());
        assert!(!ErrorEnvelope::new("Error", "x").is_method_not_found());
    }
}
