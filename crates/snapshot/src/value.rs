//! Attribute values and keys.
//!
//! Values are plain JSON data. Equality is structural, so direct and deep
//! equality coincide and no patch is emitted for an equal value.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use serde_json::Value;

/// Marker key identifying a ref value (`{"__ref": ...}`).
pub const REF_MARKER: &str = "__ref";

/// Value committed in place of a ref; refs never cross threads.
pub fn committed_ref() -> Value {
    Value::from(1)
}

/// Attribute address: a position in the instance's value array, or a named
/// extra prop.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrKey {
    Index(usize),
    Name(Arc<str>),
}

impl AttrKey {
    pub fn name(name: &str) -> Self {
        AttrKey::Name(Arc::from(name))
    }
}

impl From<usize> for AttrKey {
    fn from(index: usize) -> Self {
        AttrKey::Index(index)
    }
}

impl From<&str> for AttrKey {
    fn from(name: &str) -> Self {
        AttrKey::name(name)
    }
}

impl std::fmt::Display for AttrKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttrKey::Index(index) => write!(f, "{index}"),
            AttrKey::Name(name) => f.write_str(name),
        }
    }
}

/// Missing values compare equal to `null`.
pub fn is_direct_or_deep_equal(a: Option<&Value>, b: Option<&Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (None, None) => true,
        (Some(v), None) | (None, Some(v)) => v.is_null(),
    }
}

pub fn is_ref(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.contains_key(REF_MARKER))
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
