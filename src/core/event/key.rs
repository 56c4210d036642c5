// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single grouping key field value
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum KeyValue {
    Int(i64),
    Str(String),
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Str(v) => write!(f, "{}", v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        KeyValue::Int(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        KeyValue::Str(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        KeyValue::Str(value)
    }
}

/// Ordered tuple of grouping field values.
///
/// The empty key is the global key used when a query has no grouping fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupingKey(Vec<KeyValue>);

impl GroupingKey {
    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    /// Key of the single aggregate produced by an ungrouped query
    pub fn global() -> Self {
        Self(Vec::new())
    }

    /// Convenience constructor for a single integer key field
    pub fn int(value: i64) -> Self {
        Self(vec![KeyValue::Int(value)])
    }

    /// Convenience constructor for a single string key field
    pub fn str(value: impl Into<String>) -> Self {
        Self(vec![KeyValue::Str(value.into())])
    }

    pub fn is_global(&self) -> bool {
        self.0.is_empty()
    }

    pub fn arity(&self) -> usize {
        self.0.len()
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }
}

impl fmt::Display for GroupingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "()");
        }
        write!(f, "(")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", value)?;
        }
        write!(f, ")")
    }
}
