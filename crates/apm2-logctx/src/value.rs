//! Property values and the factory that builds them.
//!
//! Context entries capture their values eagerly as [`serde_json::Value`] so
//! that an entry is immutable once pushed. The conversion into a
//! [`PropertyValue`] happens at enrichment time through a
//! [`PropertyFactory`], which is where the destructure hint is honoured:
//!
//! - primitives always become scalars
//! - arrays always become sequences
//! - objects become structures only when destructuring was requested, and are
//!   otherwise rendered to a single text scalar

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

/// Default limit on how deep the factory descends into nested values.
pub const DEFAULT_MAX_DESTRUCTURING_DEPTH: usize = 10;

/// A value attached to a [`crate::LogRecord`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Absent value.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Signed integer scalar.
    Int(i64),
    /// Unsigned integer scalar that does not fit in an `i64`.
    UInt(u64),
    /// Floating point scalar.
    Float(f64),
    /// Text scalar.
    Text(String),
    /// Ordered sequence of values.
    Sequence(Vec<PropertyValue>),
    /// Named members of a destructured value.
    Structure(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Returns the integer held by this value, if it is an integer scalar that
    /// fits in an `i64`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::UInt(n) => i64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Returns the text held by this value, if it is a text scalar.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns `true` for every variant except sequences and structures.
    #[must_use]
    pub const fn is_scalar(&self) -> bool {
        !matches!(self, Self::Sequence(_) | Self::Structure(_))
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::UInt(n) => write!(f, "{n}"),
            Self::Float(n) => write!(f, "{n}"),
            Self::Text(s) => write!(f, "{s:?}"),
            Self::Sequence(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            },
            Self::Structure(members) => {
                write!(f, "{{")?;
                for (i, (name, value)) in members.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                write!(f, "}}")
            },
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// A named value ready to be written into a record.
#[derive(Debug, Clone, PartialEq)]
pub struct LogProperty {
    /// Property name.
    pub name: String,
    /// Property value.
    pub value: PropertyValue,
}

impl LogProperty {
    /// Creates a new property.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Builds properties at enrichment time.
///
/// The factory is supplied by whoever drives enrichment and is passed through
/// the context stack unchanged.
pub trait PropertyFactory: Send + Sync {
    /// Creates a property from a captured value.
    fn create_property(&self, name: &str, value: &Value, destructure: bool) -> LogProperty;
}

/// The stock [`PropertyFactory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultPropertyFactory {
    max_depth: usize,
}

impl DefaultPropertyFactory {
    /// Creates a factory with the default depth limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DESTRUCTURING_DEPTH,
        }
    }

    /// Sets how many levels of nesting are converted before values are
    /// replaced with [`PropertyValue::Null`].
    #[must_use]
    pub const fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Returns the depth limit.
    #[must_use]
    pub const fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Converts a captured value according to the destructure hint.
    #[must_use]
    pub fn convert(&self, value: &Value, destructure: bool) -> PropertyValue {
        self.convert_at(value, destructure, 0)
    }

    fn convert_at(&self, value: &Value, destructure: bool, depth: usize) -> PropertyValue {
        if depth > self.max_depth {
            return PropertyValue::Null;
        }

        match value {
            Value::Null => PropertyValue::Null,
            Value::Bool(b) => PropertyValue::Bool(*b),
            Value::Number(n) => n.as_i64().map_or_else(
                || {
                    n.as_u64().map_or_else(
                        || PropertyValue::Float(n.as_f64().unwrap_or(f64::NAN)),
                        PropertyValue::UInt,
                    )
                },
                PropertyValue::Int,
            ),
            Value::String(s) => PropertyValue::Text(s.clone()),
            Value::Array(items) => PropertyValue::Sequence(
                items
                    .iter()
                    .map(|item| self.convert_at(item, destructure, depth + 1))
                    .collect(),
            ),
            Value::Object(members) if destructure => PropertyValue::Structure(
                members
                    .iter()
                    .map(|(name, member)| {
                        (name.clone(), self.convert_at(member, destructure, depth + 1))
                    })
                    .collect(),
            ),
            Value::Object(_) => PropertyValue::Text(value.to_string()),
        }
    }
}

impl Default for DefaultPropertyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl PropertyFactory for DefaultPropertyFactory {
    fn create_property(&self, name: &str, value: &Value, destructure: bool) -> LogProperty {
        LogProperty {
            name: name.to_string(),
            value: self.convert(value, destructure),
        }
    }
}
