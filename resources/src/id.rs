//! Canonical record identifiers.
//!
//! The admin API is inconsistent about ids: the same record may come back
//! as `7` from one endpoint and `"7"` from another. [`RecordId`] normalizes
//! both on construction so comparisons never depend on the wire form.

use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use serde_json::Value;

/// Largest integer an `f64` represents exactly
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Identifier of a remote record, always compared in string form
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(String);

impl RecordId {
    /// Create an id from its string form (surrounding whitespace is ignored)
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Read an id from a JSON string or number
    ///
    /// Integral floats (`7.0`) canonicalize to their integer form. Returns
    /// `None` for any other JSON type and for blank strings.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(Self::new(s.as_str())),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self(i.to_string()))
                } else if let Some(u) = n.as_u64() {
                    Some(Self(u.to_string()))
                } else {
                    let f = n.as_f64()?;
                    if f.is_finite() && f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT {
                        #[allow(clippy::cast_possible_truncation)]
                        Some(Self((f as i64).to_string()))
                    } else {
                        Some(Self(n.to_string()))
                    }
                }
            },
            _ => None,
        }
    }

    /// The canonical string form
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&RecordId> for RecordId {
    fn from(id: &RecordId) -> Self {
        id.clone()
    }
}

macro_rules! record_id_from_int {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for RecordId {
                fn from(id: $ty) -> Self {
                    Self(id.to_string())
                }
            }
        )*
    };
}

record_id_from_int!(i32, i64, u32, u64, usize);

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_value(&value)
            .ok_or_else(|| D::Error::custom("record id must be a non-empty string or a number"))
    }
}
