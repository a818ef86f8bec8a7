//! Value and timestamp primitives shared by every other `orion-*` crate.
//!
//! Nothing in here depends on storage, the search space builder, or the
//! EVC engine; it exists so those crates can agree on a wire-compatible
//! representation of a parameter value without depending on each other.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single scalar value carried by a [`Trial`](https://docs.rs/orion-trial)
/// parameter or result. Real and integer are kept distinct so a dimension's
/// `Kind` round-trips through sampling without reinterpreting the bits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Real(f64),
    Integer(i64),
    Categorical(String),
    Vector(Vec<Value>),
}

impl Value {
    #[must_use]
    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Real(_) => "real",
            Value::Integer(_) => "integer",
            Value::Categorical(_) => "categorical",
            Value::Vector(_) => "vector",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Real(v) => write!(f, "{v}"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Categorical(v) => write!(f, "{v}"),
            Value::Vector(vs) => {
                write!(f, "[")?;
                for (i, v) in vs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// The type a [`crate::Value`] must conform to, mirroring a dimension's declared kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamKind {
    Real,
    Integer,
    Categorical,
    Fidelity,
}

/// The tag on a single entry of a trial's results list (spec §3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Objective,
    Gradient,
    Statistic,
    Constraint,
}

/// Milliseconds since the Unix epoch. A thin newtype rather than pulling in
/// a calendar crate the rest of the workspace has no other use for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    #[must_use]
    pub fn saturating_sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_kind_names() {
        assert_eq!(Value::Real(1.0).kind(), "real");
        assert_eq!(Value::Integer(1).kind(), "integer");
        assert_eq!(Value::Categorical("a".into()).kind(), "categorical");
    }

    #[test]
    fn value_display_roundtrips_numbers() {
        assert_eq!(Value::Real(0.5).to_string(), "0.5");
        assert_eq!(Value::Integer(-3).to_string(), "-3");
    }

    #[test]
    fn timestamp_ordering() {
        assert!(Timestamp(10) < Timestamp(20));
        assert_eq!(Timestamp(20).saturating_sub(Timestamp(10)), 10);
    }
}
