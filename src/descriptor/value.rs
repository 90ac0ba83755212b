/*!
 * Property Values
 * Scalar type system and typed value storage for profile properties
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Conversion failures between literals and typed values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("cannot parse {literal:?} as {ty}")]
    Parse { ty: ScalarType, literal: String },

    #[error("value of type {actual} where {expected} was required")]
    TypeMismatch {
        expected: ScalarType,
        actual: ScalarType,
    },

    #[error("numeric result {value} does not fit scalar type {ty}")]
    Narrowing { ty: ScalarType, value: f64 },

    #[error("type {ty} has no numeric representation")]
    NonNumeric { ty: ScalarType },
}

/// Scalar types a simple property may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Boolean,
    Char,
    Octet,
    Short,
    UShort,
    Long,
    ULong,
    LongLong,
    ULongLong,
    Float,
    Double,
    String,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Boolean => "boolean",
            ScalarType::Char => "char",
            ScalarType::Octet => "octet",
            ScalarType::Short => "short",
            ScalarType::UShort => "ushort",
            ScalarType::Long => "long",
            ScalarType::ULong => "ulong",
            ScalarType::LongLong => "longlong",
            ScalarType::ULongLong => "ulonglong",
            ScalarType::Float => "float",
            ScalarType::Double => "double",
            ScalarType::String => "string",
        };
        f.write_str(name)
    }
}

impl ScalarType {
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            ScalarType::Boolean | ScalarType::Char | ScalarType::String
        )
    }
}

/// A single typed scalar value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SimpleValue {
    Boolean(bool),
    Char(char),
    Octet(u8),
    Short(i16),
    UShort(u16),
    Long(i32),
    ULong(u32),
    LongLong(i64),
    ULongLong(u64),
    Float(f32),
    Double(f64),
    String(String),
}

impl SimpleValue {
    pub fn scalar_type(&self) -> ScalarType {
        match self {
            SimpleValue::Boolean(_) => ScalarType::Boolean,
            SimpleValue::Char(_) => ScalarType::Char,
            SimpleValue::Octet(_) => ScalarType::Octet,
            SimpleValue::Short(_) => ScalarType::Short,
            SimpleValue::UShort(_) => ScalarType::UShort,
            SimpleValue::Long(_) => ScalarType::Long,
            SimpleValue::ULong(_) => ScalarType::ULong,
            SimpleValue::LongLong(_) => ScalarType::LongLong,
            SimpleValue::ULongLong(_) => ScalarType::ULongLong,
            SimpleValue::Float(_) => ScalarType::Float,
            SimpleValue::Double(_) => ScalarType::Double,
            SimpleValue::String(_) => ScalarType::String,
        }
    }

    /// Parse a profile literal into a value of the declared type.
    pub fn parse(ty: ScalarType, literal: &str) -> Result<SimpleValue, ValueError> {
        let err = || ValueError::Parse {
            ty,
            literal: literal.to_string(),
        };
        let trimmed = literal.trim();
        let value = match ty {
            ScalarType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => SimpleValue::Boolean(true),
                "false" | "0" => SimpleValue::Boolean(false),
                _ => return Err(err()),
            },
            ScalarType::Char => {
                let mut chars = trimmed.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => SimpleValue::Char(c),
                    _ => return Err(err()),
                }
            }
            ScalarType::Octet => SimpleValue::Octet(trimmed.parse().map_err(|_| err())?),
            ScalarType::Short => SimpleValue::Short(trimmed.parse().map_err(|_| err())?),
            ScalarType::UShort => SimpleValue::UShort(trimmed.parse().map_err(|_| err())?),
            ScalarType::Long => SimpleValue::Long(trimmed.parse().map_err(|_| err())?),
            ScalarType::ULong => SimpleValue::ULong(trimmed.parse().map_err(|_| err())?),
            ScalarType::LongLong => SimpleValue::LongLong(trimmed.parse().map_err(|_| err())?),
            ScalarType::ULongLong => SimpleValue::ULongLong(trimmed.parse().map_err(|_| err())?),
            ScalarType::Float => SimpleValue::Float(trimmed.parse().map_err(|_| err())?),
            ScalarType::Double => SimpleValue::Double(trimmed.parse().map_err(|_| err())?),
            ScalarType::String => SimpleValue::String(literal.to_string()),
        };
        Ok(value)
    }

    /// Numeric view of the value, used by capacity formulas.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SimpleValue::Octet(v) => Some(*v as f64),
            SimpleValue::Short(v) => Some(*v as f64),
            SimpleValue::UShort(v) => Some(*v as f64),
            SimpleValue::Long(v) => Some(*v as f64),
            SimpleValue::ULong(v) => Some(*v as f64),
            SimpleValue::LongLong(v) => Some(*v as f64),
            SimpleValue::ULongLong(v) => Some(*v as f64),
            SimpleValue::Float(v) => Some(*v as f64),
            SimpleValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Convert a computed numeric result back to the declared scalar type.
    pub fn from_f64(ty: ScalarType, value: f64) -> Result<SimpleValue, ValueError> {
        fn narrow<T>(ty: ScalarType, value: f64, min: f64, max: f64) -> Result<T, ValueError>
        where
            T: num_cast::FromF64,
        {
            if !value.is_finite() || value < min || value > max {
                return Err(ValueError::Narrowing { ty, value });
            }
            Ok(T::from_f64(value))
        }

        let converted = match ty {
            ScalarType::Octet => {
                SimpleValue::Octet(narrow(ty, value, u8::MIN as f64, u8::MAX as f64)?)
            }
            ScalarType::Short => {
                SimpleValue::Short(narrow(ty, value, i16::MIN as f64, i16::MAX as f64)?)
            }
            ScalarType::UShort => {
                SimpleValue::UShort(narrow(ty, value, u16::MIN as f64, u16::MAX as f64)?)
            }
            ScalarType::Long => {
                SimpleValue::Long(narrow(ty, value, i32::MIN as f64, i32::MAX as f64)?)
            }
            ScalarType::ULong => {
                SimpleValue::ULong(narrow(ty, value, u32::MIN as f64, u32::MAX as f64)?)
            }
            ScalarType::LongLong => {
                SimpleValue::LongLong(narrow(ty, value, i64::MIN as f64, i64::MAX as f64)?)
            }
            ScalarType::ULongLong => {
                SimpleValue::ULongLong(narrow(ty, value, u64::MIN as f64, u64::MAX as f64)?)
            }
            ScalarType::Float => {
                if !value.is_finite() {
                    return Err(ValueError::Narrowing { ty, value });
                }
                SimpleValue::Float(value as f32)
            }
            ScalarType::Double => SimpleValue::Double(value),
            other => return Err(ValueError::NonNumeric { ty: other }),
        };
        Ok(converted)
    }

    /// Render the value the way exec params and capacity requests need it.
    pub fn render(&self) -> String {
        match self {
            SimpleValue::Boolean(v) => v.to_string(),
            SimpleValue::Char(v) => v.to_string(),
            SimpleValue::Octet(v) => v.to_string(),
            SimpleValue::Short(v) => v.to_string(),
            SimpleValue::UShort(v) => v.to_string(),
            SimpleValue::Long(v) => v.to_string(),
            SimpleValue::ULong(v) => v.to_string(),
            SimpleValue::LongLong(v) => v.to_string(),
            SimpleValue::ULongLong(v) => v.to_string(),
            SimpleValue::Float(v) => v.to_string(),
            SimpleValue::Double(v) => v.to_string(),
            SimpleValue::String(v) => v.clone(),
        }
    }
}

mod num_cast {
    pub trait FromF64 {
        fn from_f64(value: f64) -> Self;
    }

    macro_rules! impl_from_f64 {
        ($($t:ty),*) => {
            $(impl FromF64 for $t {
                fn from_f64(value: f64) -> Self {
                    value as $t
                }
            })*
        };
    }

    impl_from_f64!(u8, i16, u16, i32, u32, i64, u64);
}

/// An ordered set of named scalar fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StructValue {
    pub fields: Vec<(String, SimpleValue)>,
}

impl StructValue {
    pub fn get(&self, id: &str) -> Option<&SimpleValue> {
        self.fields.iter().find(|(fid, _)| fid == id).map(|(_, v)| v)
    }

    pub fn set(&mut self, id: &str, value: SimpleValue) {
        match self.fields.iter_mut().find(|(fid, _)| fid == id) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((id.to_string(), value)),
        }
    }
}

/// The value shapes a property may carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", content = "data", rename_all = "snake_case")]
pub enum PropertyValue {
    Simple(SimpleValue),
    Sequence(Vec<SimpleValue>),
    Struct(StructValue),
    StructSequence(Vec<StructValue>),
}

impl PropertyValue {
    pub fn as_simple(&self) -> Option<&SimpleValue> {
        match self {
            PropertyValue::Simple(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            PropertyValue::Struct(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_typed_literals() {
        assert_eq!(
            SimpleValue::parse(ScalarType::Long, "42").unwrap(),
            SimpleValue::Long(42)
        );
        assert_eq!(
            SimpleValue::parse(ScalarType::Boolean, "True").unwrap(),
            SimpleValue::Boolean(true)
        );
        assert_eq!(
            SimpleValue::parse(ScalarType::Double, "2.5").unwrap(),
            SimpleValue::Double(2.5)
        );
        assert!(SimpleValue::parse(ScalarType::Octet, "300").is_err());
        assert!(SimpleValue::parse(ScalarType::Long, "abc").is_err());
    }

    #[test]
    fn test_from_f64_narrowing() {
        assert_eq!(
            SimpleValue::from_f64(ScalarType::Short, 6.0).unwrap(),
            SimpleValue::Short(6)
        );
        assert!(SimpleValue::from_f64(ScalarType::Octet, 1000.0).is_err());
        assert!(SimpleValue::from_f64(ScalarType::String, 1.0).is_err());
    }

    #[test]
    fn test_narrowing_error_carries_offending_value() {
        assert_eq!(
            SimpleValue::from_f64(ScalarType::Short, 1e9).unwrap_err(),
            ValueError::Narrowing {
                ty: ScalarType::Short,
                value: 1e9
            }
        );
    }

    #[test]
    fn test_struct_value_set_replaces() {
        let mut sv = StructValue::default();
        sv.set("bandwidth", SimpleValue::Long(1));
        sv.set("bandwidth", SimpleValue::Long(2));
        assert_eq!(sv.fields.len(), 1);
        assert_eq!(sv.get("bandwidth"), Some(&SimpleValue::Long(2)));
    }
}
