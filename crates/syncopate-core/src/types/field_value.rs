use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::field_type::FieldType;

/// Runtime value for any field.
///
/// The schema's declared [`FieldType`] selects the discriminant on the way
/// in; values arriving for undeclared fields are converted from their JSON
/// shape. The tagged serde form is used by the write-ahead log so that
/// datetimes survive a replay without re-consulting the schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
}

impl FieldValue {
    /// Name of the runtime discriminant, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "datetime",
            Self::Json(_) => "json",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Converts a JSON value checked against a declared field type.
    ///
    /// Null is always admissible here; nullability is enforced by the
    /// store, which knows whether the field allows it.
    pub fn from_json(value: &serde_json::Value, declared: FieldType) -> Result<Self, String> {
        if value.is_null() {
            return Ok(Self::Null);
        }
        match declared {
            FieldType::String => match value {
                serde_json::Value::String(s) => Ok(Self::String(s.clone())),
                other => Err(format!("expected string, got {other}")),
            },
            FieldType::Integer => match value {
                serde_json::Value::Number(n) => n
                    .as_i64()
                    .map(Self::Integer)
                    .ok_or_else(|| format!("expected integer, got {value}")),
                other => Err(format!("expected integer, got {other}")),
            },
            FieldType::Float => match value {
                serde_json::Value::Number(n) => n
                    .as_f64()
                    .map(Self::Float)
                    .ok_or_else(|| format!("expected float, got {value}")),
                other => Err(format!("expected float, got {other}")),
            },
            FieldType::Boolean => match value {
                serde_json::Value::Bool(b) => Ok(Self::Boolean(*b)),
                other => Err(format!("expected boolean, got {other}")),
            },
            FieldType::DateTime => match value {
                serde_json::Value::String(s) => s
                    .parse::<DateTime<Utc>>()
                    .map(Self::DateTime)
                    .map_err(|e| format!("invalid datetime '{s}': {e}")),
                other => Err(format!("expected datetime string, got {other}")),
            },
            FieldType::Json => Ok(Self::Json(value.clone())),
        }
    }

    /// Converts a JSON value for a field with no schema declaration.
    /// Arrays and objects land as [`FieldValue::Json`].
    pub fn from_json_untyped(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    Self::String(n.to_string())
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            other => Self::Json(other.clone()),
        }
    }

    /// The plain (untagged) JSON shape used on the wire.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Integer(i) => serde_json::json!(i),
            Self::Float(f) => serde_json::json!(f),
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::DateTime(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::Json(v) => v.clone(),
        }
    }

    /// Orders two values when their discriminants are comparable.
    /// Integers and floats cross-compare; everything else requires the
    /// same discriminant.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        match (self, other) {
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::DateTime(a), Self::DateTime(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Equality for filter evaluation: ordered equality when comparable,
    /// structural equality otherwise.
    pub fn loose_eq(&self, other: &FieldValue) -> bool {
        match self.compare(other) {
            Some(ord) => ord == Ordering::Equal,
            None => self == other,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Canonical string used as the hash key of index maps. Values of
    /// different discriminants never collide (single-letter prefix).
    pub fn index_key(&self) -> String {
        match self {
            Self::Null => "n:".to_string(),
            Self::String(s) => format!("s:{s}"),
            Self::Integer(i) => format!("i:{i}"),
            Self::Float(v) => format!("f:{v}"),
            Self::Boolean(b) => format!("b:{b}"),
            Self::DateTime(dt) => format!("d:{}", dt.to_rfc3339()),
            Self::Json(v) => format!("j:{v}"),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::DateTime(dt) => write!(f, "{}", dt.to_rfc3339()),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}
