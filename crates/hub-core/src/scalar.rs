//! Scalar values returned by the scalar evaluator

use std::fmt;

use serde::{Deserialize, Serialize};

/// Result of evaluating an arithmetic or boolean expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Scalar {
    /// Truthy coercion used to turn an evaluation result into a match
    ///
    /// Non-zero numbers and `true` are truthy. Text is truthy when it reads
    /// `true` (any case) or parses as a non-zero number.
    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Null => false,
            Scalar::Bool(b) => *b,
            Scalar::Integer(i) => *i != 0,
            Scalar::Real(r) => *r != 0.0 && !r.is_nan(),
            Scalar::Text(s) => {
                let s = s.trim();
                if s.eq_ignore_ascii_case("true") {
                    return true;
                }
                s.parse::<f64>().map(|n| n != 0.0).unwrap_or(false)
            }
        }
    }

    /// Numeric view of the value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Integer(i) => Some(*i as f64),
            Scalar::Real(r) => Some(*r),
            Scalar::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Text(s) => s.trim().parse().ok(),
            Scalar::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Integer(i) => write!(f, "{}", i),
            // Whole reals print without a fractional part (1.0 -> "1")
            Scalar::Real(r) if r.fract() == 0.0 && r.abs() < 1e15 => write!(f, "{}", *r as i64),
            Scalar::Real(r) => write!(f, "{}", r),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Bool(b)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Integer(i)
    }
}

impl From<f64> for Scalar {
    fn from(r: f64) -> Self {
        Scalar::Real(r)
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_truthy() {
        assert!(Scalar::Integer(1).is_truthy());
        assert!(Scalar::Integer(-3).is_truthy());
        assert!(Scalar::Real(0.5).is_truthy());
        assert!(Scalar::Bool(true).is_truthy());
        assert!(Scalar::from("true").is_truthy());
        assert!(Scalar::from("TRUE").is_truthy());
        assert!(Scalar::from("12").is_truthy());

        assert!(!Scalar::Null.is_truthy());
        assert!(!Scalar::Integer(0).is_truthy());
        assert!(!Scalar::Real(0.0).is_truthy());
        assert!(!Scalar::Bool(false).is_truthy());
        assert!(!Scalar::from("false").is_truthy());
        assert!(!Scalar::from("0").is_truthy());
        assert!(!Scalar::from("hello").is_truthy());
        assert!(!Scalar::from("").is_truthy());
    }

    #[test]
    fn test_display() {
        assert_eq!(Scalar::Real(1.0).to_string(), "1");
        assert_eq!(Scalar::Real(210.0).to_string(), "210");
        assert_eq!(Scalar::Real(18.7).to_string(), "18.7");
        assert_eq!(Scalar::Integer(2).to_string(), "2");
        assert_eq!(Scalar::Null.to_string(), "");
        assert_eq!(Scalar::from("abc").to_string(), "abc");
    }
}
