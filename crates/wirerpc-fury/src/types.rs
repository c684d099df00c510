use std::fmt;

use serde::{Deserialize, Serialize};

/// Shape of one Fury value.
///
/// In JSON, scalar types are plain strings (`"int32"`) and composite types
/// are single-key objects (`{"array": "string"}`,
/// `{"object": [{"name": "id", "type": "int64"}]}`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeDesc {
    Bool,
    Int32,
    Int64,
    Float64,
    String,
    /// Raw bytes, shown to JSON as an array of numbers `0..=255`.
    Binary,
    /// Any JSON value, carried as JSON text.
    Any,
    Array(Box<TypeDesc>),
    /// String-keyed map.
    Map(Box<TypeDesc>),
    /// One presence byte, then the value if present.
    Nullable(Box<TypeDesc>),
    /// Fields written in declaration order with no names on the wire.
    Object(Vec<FieldDesc>),
}

impl TypeDesc {
    pub fn array(item: TypeDesc) -> Self {
        TypeDesc::Array(Box::new(item))
    }

    pub fn map(value: TypeDesc) -> Self {
        TypeDesc::Map(Box::new(value))
    }

    pub fn nullable(inner: TypeDesc) -> Self {
        TypeDesc::Nullable(Box::new(inner))
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeDesc::Nullable(_) | TypeDesc::Any)
    }
}

impl fmt::Display for TypeDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDesc::Bool => f.write_str("bool"),
            TypeDesc::Int32 => f.write_str("int32"),
            TypeDesc::Int64 => f.write_str("int64"),
            TypeDesc::Float64 => f.write_str("float64"),
            TypeDesc::String => f.write_str("string"),
            TypeDesc::Binary => f.write_str("binary"),
            TypeDesc::Any => f.write_str("any"),
            TypeDesc::Array(item) => write!(f, "array<{item}>"),
            TypeDesc::Map(value) => write!(f, "map<{value}>"),
            TypeDesc::Nullable(inner) => write!(f, "{inner}?"),
            TypeDesc::Object(fields) => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.ty)?;
                }
                f.write_str("}")
            }
        }
    }
}

/// A named, typed slot: a method parameter or an object field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDesc {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeDesc,
}

impl FieldDesc {
    pub fn new(name: impl Into<String>, ty: TypeDesc) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_types_parse_from_strings() {
        let ty: TypeDesc = serde_json::from_str(r#""int32""#).unwrap();
        assert_eq!(ty, TypeDesc::Int32);
        let ty: TypeDesc = serde_json::from_str(r#""float64""#).unwrap();
        assert_eq!(ty, TypeDesc::Float64);
    }

    #[test]
    fn composite_types_parse_from_objects() {
        let ty: TypeDesc = serde_json::from_str(
            r#"{"object": [
                {"name": "id", "type": "int64"},
                {"name": "tags", "type": {"array": "string"}},
                {"name": "note", "type": {"nullable": "string"}}
            ]}"#,
        )
        .unwrap();

        assert_eq!(
            ty,
            TypeDesc::Object(vec![
                FieldDesc::new("id", TypeDesc::Int64),
                FieldDesc::new("tags", TypeDesc::array(TypeDesc::String)),
                FieldDesc::new("note", TypeDesc::nullable(TypeDesc::String)),
            ])
        );
    }

    #[test]
    fn unknown_type_name_rejected() {
        assert!(serde_json::from_str::<TypeDesc>(r#""uint8""#).is_err());
    }

    #[test]
    fn display_is_readable() {
        let ty = TypeDesc::Object(vec![
            FieldDesc::new("a", TypeDesc::map(TypeDesc::Int32)),
            FieldDesc::new("b", TypeDesc::nullable(TypeDesc::Bool)),
        ]);
        assert_eq!(ty.to_string(), "{a: map<int32>, b: bool?}");
    }
}
