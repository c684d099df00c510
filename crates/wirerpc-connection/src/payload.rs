use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use wirerpc_packet::Codec;

use crate::error::{ConnectionError, Result};

/// Body of a request, notification or response together with its codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub codec: Codec,
    pub content: Bytes,
}

impl Payload {
    pub fn new(codec: Codec, content: impl Into<Bytes>) -> Self {
        Self {
            codec,
            content: content.into(),
        }
    }

    /// JSON-encode `value`.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        Ok(Self::new(Codec::Json, serde_json::to_vec(value)?))
    }

    /// A plain string delivered to the peer unparsed.
    pub fn raw(text: impl Into<String>) -> Self {
        Self::new(Codec::Raw, text.into().into_bytes())
    }

    /// Content already encoded with a Fury descriptor.
    pub fn fury(content: impl Into<Bytes>) -> Self {
        Self::new(Codec::Fury, content)
    }

    /// The JSON value `null`.
    pub fn null() -> Self {
        Self::new(Codec::Json, Bytes::from_static(b"null"))
    }

    /// Content as UTF-8 text. Valid for JSON and raw payloads.
    pub fn text(&self) -> Result<&str> {
        if self.codec == Codec::Fury {
            return Err(self.mismatch("text"));
        }
        Ok(std::str::from_utf8(&self.content)?)
    }

    /// Deserialize the content. A raw payload reads as a JSON string.
    pub fn to_json<T: DeserializeOwned>(&self) -> Result<T> {
        match self.codec {
            Codec::Json => Ok(serde_json::from_slice(&self.content)?),
            Codec::Raw => Ok(serde_json::from_value(Value::String(
                self.text()?.to_owned(),
            ))?),
            Codec::Fury => Err(self.mismatch("json")),
        }
    }

    /// Read the content as a positional argument list.
    ///
    /// A JSON array gives its elements, an empty body gives no arguments and
    /// any other value is a single argument.
    pub fn json_args(&self) -> Result<Vec<Value>> {
        if self.content.is_empty() && self.codec == Codec::Json {
            return Ok(Vec::new());
        }
        match self.to_json::<Value>()? {
            Value::Array(args) => Ok(args),
            single => Ok(vec![single]),
        }
    }

    fn mismatch(&self, expected: &'static str) -> ConnectionError {
        ConnectionError::CodecMismatch {
            expected,
            found: self.codec.name(),
        }
    }
}
