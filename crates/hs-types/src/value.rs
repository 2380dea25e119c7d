//! Scalar values carried by hyperparameter declarations and assignments.
//!
//! The kind of every value is fixed when it is declared: integers, reals and
//! text are distinct variants rather than being re-inferred from raw numbers
//! each time a wire field has to be chosen.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a scalar value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Integer,
    Real,
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::Real => write!(f, "real"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// A numeric bound, step or base.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Integer(i64),
    Real(f64),
}

impl Numeric {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Real(_) => ValueKind::Real,
        }
    }

    /// Widen to `f64`; integers convert losslessly up to 2^53.
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Integer(v) => *v as f64,
            Self::Real(v) => *v,
        }
    }
}

impl From<i64> for Numeric {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for Numeric {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<u32> for Numeric {
    fn from(v: u32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for Numeric {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v:?}"),
        }
    }
}

/// A concrete scalar: a static value, a list element, or a sampled value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ParamValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer(_) => ValueKind::Integer,
            Self::Real(_) => ValueKind::Real,
            Self::Text(_) => ValueKind::Text,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric view of the value; `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(v) => Some(*v as f64),
            Self::Real(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric part of the value, if any.
    pub fn as_numeric(&self) -> Option<Numeric> {
        match self {
            Self::Integer(v) => Some(Numeric::Integer(*v)),
            Self::Real(v) => Some(Numeric::Real(*v)),
            Self::Text(_) => None,
        }
    }

    /// Convert a JSON scalar. Booleans, nulls, arrays and objects have no
    /// counterpart and yield `None`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Integer(i)),
                None => n.as_f64().map(Self::Real),
            },
            serde_json::Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl From<Numeric> for ParamValue {
    fn from(v: Numeric) -> Self {
        match v {
            Numeric::Integer(i) => Self::Integer(i),
            Numeric::Real(r) => Self::Real(r),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(v) => write!(f, "{v}"),
            // Debug keeps the fractional part, so 1.0 stays "1.0" on a command line.
            Self::Real(v) => write!(f, "{v:?}"),
            Self::Text(v) => write!(f, "{v}"),
        }
    }
}
