use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wirerpc_packet::{BinaryReader, BinaryWriter};

use crate::codec::{decode_value, encode_value};
use crate::error::{FuryError, Result};
use crate::types::{FieldDesc, TypeDesc};

/// Result type of a remote method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseDesc {
    #[serde(rename = "type")]
    pub ty: TypeDesc,
}

/// Wire contract of one remote method.
///
/// ```json
/// {
///   "method": "shortUrl",
///   "request": [{"name": "url", "type": "string"}],
///   "response": {"type": "string"}
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMethod {
    pub method: String,
    #[serde(default)]
    pub request: Vec<FieldDesc>,
    pub response: ResponseDesc,
}

impl ProtocolMethod {
    pub fn new(method: impl Into<String>, request: Vec<FieldDesc>, response: TypeDesc) -> Self {
        Self {
            method: method.into(),
            request,
            response: ResponseDesc { ty: response },
        }
    }

    /// Encode positional arguments. Missing trailing arguments are `null`.
    pub fn encode_request(&self, args: &[Value]) -> Result<Bytes> {
        if args.len() > self.request.len() {
            return Err(FuryError::ArityMismatch {
                method: self.method.clone(),
                expected: self.request.len(),
                found: args.len(),
            });
        }

        let mut writer = BinaryWriter::new();
        for (i, param) in self.request.iter().enumerate() {
            let arg = args.get(i).unwrap_or(&Value::Null);
            encode_value(arg, &param.ty, &mut writer).map_err(|e| self.in_param(param, e))?;
        }
        Ok(writer.dump())
    }

    /// Decode the positional arguments of an inbound request.
    pub fn decode_request(&self, content: Bytes) -> Result<Vec<Value>> {
        let mut reader = BinaryReader::from_bytes(content);
        let mut args = Vec::with_capacity(self.request.len());
        for param in &self.request {
            let arg = decode_value(&mut reader, &param.ty).map_err(|e| self.in_param(param, e))?;
            args.push(arg);
        }
        expect_exhausted(&reader)?;
        Ok(args)
    }

    pub fn encode_response(&self, value: &Value) -> Result<Bytes> {
        let mut writer = BinaryWriter::new();
        encode_value(value, &self.response.ty, &mut writer)?;
        Ok(writer.dump())
    }

    pub fn decode_response(&self, content: Bytes) -> Result<Value> {
        let mut reader = BinaryReader::from_bytes(content);
        let value = decode_value(&mut reader, &self.response.ty)?;
        expect_exhausted(&reader)?;
        Ok(value)
    }

    fn in_param(&self, param: &FieldDesc, err: FuryError) -> FuryError {
        match err {
            FuryError::TypeMismatch { expected, found } => FuryError::TypeMismatch {
                expected: format!("{expected} for {}({})", self.method, param.name),
                found,
            },
            other => other,
        }
    }
}

fn expect_exhausted(reader: &BinaryReader) -> Result<()> {
    if !reader.is_exhausted() {
        return Err(FuryError::InvalidData(format!(
            "{} trailing bytes after value",
            reader.remaining()
        )));
    }
    Ok(())
}
