use serde_json::{Map, Number, Value};
use wirerpc_packet::{BinaryReader, BinaryWriter};

use crate::error::{FuryError, Result};
use crate::types::TypeDesc;

/// Append `value` to `writer` in the layout described by `ty`.
pub fn encode_value(value: &Value, ty: &TypeDesc, writer: &mut BinaryWriter) -> Result<()> {
    match ty {
        TypeDesc::Bool => {
            let v = value.as_bool().ok_or_else(|| mismatch(ty, value))?;
            writer.u8(u8::from(v));
        }
        TypeDesc::Int32 => {
            let v = integer(value, ty)?;
            let v = i32::try_from(v).map_err(|_| FuryError::OutOfRange {
                ty: "int32",
                value: v.to_string(),
            })?;
            writer.var_i32(v);
        }
        TypeDesc::Int64 => {
            writer.var_i64(integer(value, ty)?);
        }
        TypeDesc::Float64 => {
            let v = value.as_f64().ok_or_else(|| mismatch(ty, value))?;
            writer.f64(v);
        }
        TypeDesc::String => {
            let v = value.as_str().ok_or_else(|| mismatch(ty, value))?;
            writer.string_of_var_u32(v)?;
        }
        TypeDesc::Binary => {
            let items = value.as_array().ok_or_else(|| mismatch(ty, value))?;
            let mut raw = Vec::with_capacity(items.len());
            for item in items {
                let byte = item
                    .as_u64()
                    .and_then(|b| u8::try_from(b).ok())
                    .ok_or_else(|| FuryError::OutOfRange {
                        ty: "binary byte",
                        value: item.to_string(),
                    })?;
                raw.push(byte);
            }
            writer.bytes_of_var_u32(&raw)?;
        }
        TypeDesc::Any => {
            writer.string_of_var_u32(&serde_json::to_string(value)?)?;
        }
        TypeDesc::Array(item_ty) => {
            let items = value.as_array().ok_or_else(|| mismatch(ty, value))?;
            writer.var_u32(count(items.len())?);
            for item in items {
                encode_value(item, item_ty, writer)?;
            }
        }
        TypeDesc::Map(value_ty) => {
            let entries = value.as_object().ok_or_else(|| mismatch(ty, value))?;
            writer.var_u32(count(entries.len())?);
            for (key, entry) in entries {
                writer.string_of_var_u32(key)?;
                encode_value(entry, value_ty, writer)?;
            }
        }
        TypeDesc::Nullable(inner) => {
            if value.is_null() {
                writer.u8(0);
            } else {
                writer.u8(1);
                encode_value(value, inner, writer)?;
            }
        }
        TypeDesc::Object(fields) => {
            let object = value.as_object().ok_or_else(|| mismatch(ty, value))?;
            for field in fields {
                match object.get(&field.name) {
                    Some(v) => encode_value(v, &field.ty, writer)?,
                    None if field.ty.is_nullable() => encode_value(&Value::Null, &field.ty, writer)?,
                    None => return Err(FuryError::MissingField(field.name.clone())),
                }
            }
        }
    }
    Ok(())
}

/// Read one value laid out as `ty` from `reader`.
pub fn decode_value(reader: &mut BinaryReader, ty: &TypeDesc) -> Result<Value> {
    let value = match ty {
        TypeDesc::Bool => match reader.u8()? {
            0 => Value::Bool(false),
            1 => Value::Bool(true),
            other => {
                return Err(FuryError::InvalidData(format!(
                    "bool byte must be 0 or 1, got {other}"
                )))
            }
        },
        TypeDesc::Int32 => Value::from(reader.var_i32()?),
        TypeDesc::Int64 => Value::from(reader.var_i64()?),
        TypeDesc::Float64 => {
            let v = reader.f64()?;
            Number::from_f64(v).map(Value::Number).ok_or_else(|| {
                FuryError::InvalidData(format!("float64 {v} has no JSON representation"))
            })?
        }
        TypeDesc::String => Value::String(reader.string_of_var_u32()?),
        TypeDesc::Binary => {
            let raw = reader.bytes_of_var_u32()?;
            Value::Array(raw.iter().map(|b| Value::from(*b)).collect())
        }
        TypeDesc::Any => serde_json::from_str(&reader.string_of_var_u32()?)?,
        TypeDesc::Array(item_ty) => {
            let len = reader.var_u32()? as usize;
            check_count(len, min_wire_size(item_ty), reader)?;
            let mut items = Vec::with_capacity(len.min(reader.remaining()));
            for _ in 0..len {
                items.push(decode_value(reader, item_ty)?);
            }
            Value::Array(items)
        }
        TypeDesc::Map(value_ty) => {
            let len = reader.var_u32()? as usize;
            // Every key carries at least its length byte.
            check_count(len, 1 + min_wire_size(value_ty), reader)?;
            let mut entries = Map::new();
            for _ in 0..len {
                let key = reader.string_of_var_u32()?;
                entries.insert(key, decode_value(reader, value_ty)?);
            }
            Value::Object(entries)
        }
        TypeDesc::Nullable(inner) => match reader.u8()? {
            0 => Value::Null,
            1 => decode_value(reader, inner)?,
            other => {
                return Err(FuryError::InvalidData(format!(
                    "presence byte must be 0 or 1, got {other}"
                )))
            }
        },
        TypeDesc::Object(fields) => {
            let mut object = Map::new();
            for field in fields {
                object.insert(field.name.clone(), decode_value(reader, &field.ty)?);
            }
            Value::Object(object)
        }
    };
    Ok(value)
}

fn integer(value: &Value, ty: &TypeDesc) -> Result<i64> {
    if let Some(v) = value.as_i64() {
        return Ok(v);
    }
    match value.as_u64() {
        Some(v) => Err(FuryError::OutOfRange {
            ty: "int64",
            value: v.to_string(),
        }),
        None => Err(mismatch(ty, value)),
    }
}

fn count(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| FuryError::OutOfRange {
        ty: "collection length",
        value: len.to_string(),
    })
}

/// Fewest bytes any value of `ty` occupies on the wire.
fn min_wire_size(ty: &TypeDesc) -> usize {
    match ty {
        TypeDesc::Float64 => 8,
        TypeDesc::Object(fields) => fields.iter().map(|field| min_wire_size(&field.ty)).sum(),
        _ => 1,
    }
}

/// Reject element counts the remaining input cannot hold.
fn check_count(len: usize, item_size: usize, reader: &BinaryReader) -> Result<()> {
    let needed = len.saturating_mul(item_size);
    if needed > reader.remaining() {
        return Err(FuryError::InvalidData(format!(
            "collection of {len} elements needs {needed} bytes, {} remaining",
            reader.remaining()
        )));
    }
    Ok(())
}

fn mismatch(ty: &TypeDesc, value: &Value) -> FuryError {
    FuryError::TypeMismatch {
        expected: ty.to_string(),
        found: json_kind(value),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::FieldDesc;

    fn encode(value: &Value, ty: &TypeDesc) -> Vec<u8> {
        let mut writer = BinaryWriter::new();
        encode_value(value, ty, &mut writer).unwrap();
        writer.dump().to_vec()
    }

    fn decode(bytes: Vec<u8>, ty: &TypeDesc) -> Value {
        let mut reader = BinaryReader::from_bytes(bytes);
        let value = decode_value(&mut reader, ty).unwrap();
        assert!(reader.is_exhausted(), "decoder should consume every byte");
        value
    }

    #[test]
    fn scalar_layouts() {
        assert_eq!(encode(&json!(true), &TypeDesc::Bool), vec![1]);
        assert_eq!(encode(&json!(-1), &TypeDesc::Int32), vec![1]);
        assert_eq!(encode(&json!(150), &TypeDesc::Int64), vec![0xac, 0x02]);
        assert_eq!(encode(&json!("hi"), &TypeDesc::String), vec![2, b'h', b'i']);
        assert_eq!(encode(&json!([1, 255]), &TypeDesc::Binary), vec![2, 1, 255]);
        assert_eq!(
            encode(&json!(1.5), &TypeDesc::Float64),
            1.5f64.to_le_bytes().to_vec()
        );
    }

    #[test]
    fn composite_values_come_back() {
        let ty = TypeDesc::Object(vec![
            FieldDesc::new("id", TypeDesc::Int64),
            FieldDesc::new("tags", TypeDesc::array(TypeDesc::String)),
            FieldDesc::new("scores", TypeDesc::map(TypeDesc::Float64)),
            FieldDesc::new("parent", TypeDesc::nullable(TypeDesc::Int32)),
            FieldDesc::new("meta", TypeDesc::Any),
        ]);
        let value = json!({
            "id": 9_007_199_254_740_993i64,
            "tags": ["a", "b"],
            "scores": {"x": 0.25},
            "parent": null,
            "meta": {"nested": [1, "two", false]}
        });

        assert_eq!(decode(encode(&value, &ty), &ty), value);
    }

    #[test]
    fn missing_nullable_field_decodes_as_null() {
        let ty = TypeDesc::Object(vec![
            FieldDesc::new("name", TypeDesc::String),
            FieldDesc::new("alias", TypeDesc::nullable(TypeDesc::String)),
        ]);
        let bytes = encode(&json!({"name": "n"}), &ty);
        assert_eq!(decode(bytes, &ty), json!({"name": "n", "alias": null}));
    }

    #[test]
    fn missing_required_field_rejected() {
        let ty = TypeDesc::Object(vec![FieldDesc::new("name", TypeDesc::String)]);
        let mut writer = BinaryWriter::new();
        let err = encode_value(&json!({}), &ty, &mut writer).unwrap_err();
        assert!(matches!(err, FuryError::MissingField(name) if name == "name"));
    }

    #[test]
    fn mismatched_values_rejected() {
        let mut writer = BinaryWriter::new();
        assert!(matches!(
            encode_value(&json!("3"), &TypeDesc::Int32, &mut writer),
            Err(FuryError::TypeMismatch { found: "string", .. })
        ));
        assert!(matches!(
            encode_value(&json!(1.5), &TypeDesc::Int64, &mut writer),
            Err(FuryError::TypeMismatch { found: "float", .. })
        ));
        assert!(matches!(
            encode_value(&json!(i64::from(i32::MAX) + 1), &TypeDesc::Int32, &mut writer),
            Err(FuryError::OutOfRange { ty: "int32", .. })
        ));
        assert!(matches!(
            encode_value(&json!([256]), &TypeDesc::Binary, &mut writer),
            Err(FuryError::OutOfRange { .. })
        ));
        assert!(matches!(
            encode_value(&json!(u64::MAX), &TypeDesc::Int64, &mut writer),
            Err(FuryError::OutOfRange { .. })
        ));
    }

    #[test]
    fn truncated_input_rejected() {
        let mut reader = BinaryReader::from_bytes(vec![5, b'a']);
        assert!(matches!(
            decode_value(&mut reader, &TypeDesc::String),
            Err(FuryError::Packet(_))
        ));
    }

    #[test]
    fn corrupt_collection_length_rejected() {
        let mut reader = BinaryReader::from_bytes(vec![0xff, 0xff, 0x03, 0x00]);
        assert!(matches!(
            decode_value(&mut reader, &TypeDesc::array(TypeDesc::Bool)),
            Err(FuryError::InvalidData(_))
        ));
    }

    #[test]
    fn empty_objects_in_arrays_come_back() {
        let ty = TypeDesc::array(TypeDesc::Object(vec![]));
        let bytes = encode(&json!([{}, {}]), &ty);
        assert_eq!(bytes, vec![2]);
        assert_eq!(decode(bytes, &ty), json!([{}, {}]));

        let nested = TypeDesc::map(TypeDesc::array(TypeDesc::Object(vec![])));
        let value = json!({"a": [{}], "b": []});
        assert_eq!(decode(encode(&value, &nested), &nested), value);
    }

    #[test]
    fn collection_length_accounts_for_item_width() {
        // Two float64 items need sixteen bytes; only eight follow.
        let mut bytes = vec![2];
        bytes.extend_from_slice(&1.0f64.to_le_bytes());
        let mut reader = BinaryReader::from_bytes(bytes);
        assert!(matches!(
            decode_value(&mut reader, &TypeDesc::array(TypeDesc::Float64)),
            Err(FuryError::InvalidData(_))
        ));
    }

    #[test]
    fn map_entry_layout() {
        let mut writer = BinaryWriter::new();
        encode_value(&json!({"k": "v"}), &TypeDesc::map(TypeDesc::String), &mut writer).unwrap();
        assert_eq!(writer.dump().as_ref(), &[1, 1, b'k', 1, b'v']);
    }

    #[test]
    fn invalid_bool_byte_rejected() {
        let mut reader = BinaryReader::from_bytes(vec![2]);
        assert!(matches!(
            decode_value(&mut reader, &TypeDesc::Bool),
            Err(FuryError::InvalidData(_))
        ));
    }
}
