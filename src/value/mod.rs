//! Values stored in table items and carried by patches.
//!
//! A value is either a [`Scalar`] leaf or a nested [`Record`]. Sequences are not
//! representable: converting a JSON array into a [`PatchNode`] fails with
//! [`PatchError::Sequence`], so every walk over a patch is an exhaustive two-way match.
//!
//! ## Example
//!
//! ```ignore
//! use dynabatch::{record, PatchNode, Record};
//!
//! let user = record! {
//!     "id" => 7,
//!     "phone" => record! { "home" => "555-0100" },
//! };
//! let phone = user.get("phone");
//! assert!(matches!(phone, Some(PatchNode::Nested(_))));
//! ```

mod record;

pub use record::Record;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

/// Either a leaf or a nested mapping of further nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum PatchNode {
    Scalar(Scalar),
    Nested(Record),
}

/// Errors raised when a JSON document cannot be read as a patch or record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// A sequence appeared where a scalar or a mapping was expected.
    #[error("malformed patch at `{}`: sequences cannot be patched", display_path(.path))]
    Sequence { path: Vec<String> },
    /// The document root was not a mapping.
    #[error("expected a mapping at the root, found {found}")]
    NotAMapping { found: &'static str },
    /// A mapping appeared where a leaf value was expected.
    #[error("expected a scalar, found a mapping")]
    NotAScalar,
}

pub(crate) fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "<root>".to_string()
    } else {
        path.join(".")
    }
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

impl PatchNode {
    /// Parse a JSON value, reporting the path of the first sequence encountered.
    pub fn from_json(value: Value) -> Result<Self, PatchError> {
        let mut path = Vec::new();
        Self::from_json_at(value, &mut path)
    }

    fn from_json_at(value: Value, path: &mut Vec<String>) -> Result<Self, PatchError> {
        match value {
            Value::Null => Ok(PatchNode::Scalar(Scalar::Null)),
            Value::Bool(b) => Ok(PatchNode::Scalar(Scalar::Bool(b))),
            Value::Number(n) => Ok(PatchNode::Scalar(Scalar::Number(n))),
            Value::String(s) => Ok(PatchNode::Scalar(Scalar::String(s))),
            Value::Array(_) => Err(PatchError::Sequence { path: path.clone() }),
            Value::Object(map) => {
                let mut record = Record::new();
                for (field, child) in map {
                    path.push(field);
                    let node = Self::from_json_at(child, path)?;
                    let field = path.pop().unwrap_or_default();
                    record.insert(field, node);
                }
                Ok(PatchNode::Nested(record))
            }
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            PatchNode::Scalar(scalar) => Some(scalar),
            PatchNode::Nested(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            PatchNode::Scalar(_) => None,
            PatchNode::Nested(record) => Some(record),
        }
    }

    pub fn is_nested(&self) -> bool {
        matches!(self, PatchNode::Nested(_))
    }

    /// The nested record, replacing a scalar with an empty one first.
    pub(crate) fn make_nested(&mut self) -> &mut Record {
        match self {
            PatchNode::Nested(record) => record,
            PatchNode::Scalar(_) => {
                *self = PatchNode::Nested(Record::new());
                self.make_nested()
            }
        }
    }
}

impl TryFrom<Value> for PatchNode {
    type Error = PatchError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        PatchNode::from_json(value)
    }
}

impl From<PatchNode> for Value {
    fn from(node: PatchNode) -> Self {
        match node {
            PatchNode::Scalar(scalar) => scalar.into(),
            PatchNode::Nested(record) => record.into(),
        }
    }
}

impl TryFrom<Value> for Scalar {
    type Error = PatchError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match PatchNode::from_json(value)? {
            PatchNode::Scalar(scalar) => Ok(scalar),
            PatchNode::Nested(_) => Err(PatchError::NotAScalar),
        }
    }
}

impl From<Scalar> for Value {
    fn from(scalar: Scalar) -> Self {
        match scalar {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(b),
            Scalar::Number(n) => Value::Number(n),
            Scalar::String(s) => Value::String(s),
        }
    }
}

// ============================================================================
// Conversions into nodes
// ============================================================================

impl From<Scalar> for PatchNode {
    fn from(scalar: Scalar) -> Self {
        PatchNode::Scalar(scalar)
    }
}

impl From<Record> for PatchNode {
    fn from(record: Record) -> Self {
        PatchNode::Nested(record)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

/// Non-finite floats become `Null`, as `serde_json::json!` does.
impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Scalar::Null, Scalar::Number)
    }
}

macro_rules! scalar_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Scalar {
                fn from(value: $ty) -> Self {
                    Scalar::Number(Number::from(value))
                }
            }

            impl From<$ty> for PatchNode {
                fn from(value: $ty) -> Self {
                    PatchNode::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

scalar_from_int!(i32, i64, u32, u64, usize);

macro_rules! node_from_scalar {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for PatchNode {
                fn from(value: $ty) -> Self {
                    PatchNode::Scalar(Scalar::from(value))
                }
            }
        )*
    };
}

node_from_scalar!(&str, String, bool, f64);
