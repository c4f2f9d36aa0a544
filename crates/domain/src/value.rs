//! Characteristic values and their coercion rules.
//!
//! The wire does not guarantee a representation: a boolean characteristic
//! may arrive as `true` or as `1`, a numeric one as `21` or `21.0`. Every
//! consumer goes through [`CharacteristicValue::coerce_bool`] or
//! [`CharacteristicValue::coerce_number`], never through ad hoc matching.

use serde::{Deserialize, Serialize};

/// A dynamically-typed scalar read from, or written to, a characteristic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CharacteristicValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl CharacteristicValue {
    /// Interpret the value as a boolean.
    ///
    /// Booleans pass through; any number `> 0` is `true`. Strings are not
    /// boolean-like and yield `None`.
    #[must_use]
    pub fn coerce_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            Self::Int(value) => Some(*value > 0),
            Self::Float(value) => Some(*value > 0.0),
            Self::String(_) => None,
        }
    }

    /// Interpret the value as a number, normalised to `f64`.
    ///
    /// Booleans map to `1.0`/`0.0`. Strings and non-finite floats yield `None`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce_number(&self) -> Option<f64> {
        match self {
            Self::Bool(value) => Some(if *value { 1.0 } else { 0.0 }),
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) if value.is_finite() => Some(*value),
            Self::Float(_) | Self::String(_) => None,
        }
    }

    /// Borrow the value as a string slice, if it is one.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for CharacteristicValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for CharacteristicValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for CharacteristicValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for CharacteristicValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}
