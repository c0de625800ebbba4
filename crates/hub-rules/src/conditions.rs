//! `{Operator, Value}` condition objects
//!
//! A condition object compares the inbound payload against a fixed value:
//!
//! ```text
//! {"Operator": ">=", "Value": 20}
//! [{"operator": "==", "value": "RED"}, {"operator": "==", "value": "ORANGE"}]
//! ```
//!
//! Lists match when any element matches. Single-quoted JSON is accepted.

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// One operator/value pair
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ConditionObject {
    #[serde(alias = "Operator", default)]
    pub operator: String,

    #[serde(alias = "Value", default, deserialize_with = "value_as_text")]
    pub value: String,
}

fn value_as_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

fn parse_lenient<T: serde::de::DeserializeOwned>(text: &str) -> Option<T> {
    serde_json::from_str(text)
        .or_else(|_| serde_json::from_str(&text.replace('\'', "\"")))
        .map_err(|e| debug!(text, error = %e, "Unparseable condition"))
        .ok()
}

impl ConditionObject {
    pub fn new(operator: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            value: value.into(),
        }
    }

    /// Parse a single `{...}` condition
    pub fn parse(text: &str) -> Option<Self> {
        parse_lenient(text)
    }

    /// Parse a `[{...}, ...]` condition list
    pub fn parse_list(text: &str) -> Option<Vec<Self>> {
        parse_lenient(text)
    }

    /// Whether `payload` satisfies this condition
    ///
    /// Non-numeric operands of numeric operators and unknown operators never
    /// match.
    pub fn evaluate(&self, payload: &str) -> bool {
        let operator = self.operator.trim();
        if operator.is_empty() || self.value.is_empty() {
            return false;
        }

        let payload = payload.trim();
        match operator.to_lowercase().as_str() {
            "contains" => contains_ignore_case(payload, &self.value),
            "contains not" => !contains_ignore_case(payload, &self.value),
            ">" => self.compare(payload, |p, v| p > v),
            "<" => self.compare(payload, |p, v| p < v),
            ">=" => self.compare(payload, |p, v| p >= v),
            "<=" => self.compare(payload, |p, v| p <= v),
            "=" | "==" => match (number(payload), number(&self.value)) {
                (Some(p), Some(v)) => p == v,
                (_, Some(_)) => false,
                _ => payload == self.value,
            },
            "%" => match (number(payload), number(&self.value)) {
                (Some(_), Some(v)) if v == 0.0 => false,
                (Some(p), Some(v)) => p % v != 0.0,
                _ => false,
            },
            other => {
                debug!(operator = other, "Unknown condition operator");
                false
            }
        }
    }

    fn compare(&self, payload: &str, op: impl Fn(f64, f64) -> bool) -> bool {
        match (number(payload), number(&self.value)) {
            (Some(p), Some(v)) => op(p, v),
            _ => false,
        }
    }
}

fn contains_ignore_case(payload: &str, value: &str) -> bool {
    payload.to_lowercase().contains(&value.to_lowercase())
}

fn number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Evaluate a condition list, first match wins
pub fn any_matches(conditions: &[ConditionObject], payload: &str) -> bool {
    conditions.iter().any(|condition| condition.evaluate(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variants() {
        let upper = ConditionObject::parse(r#"{"Operator":"<","Value":"70"}"#).unwrap();
        assert_eq!(upper, ConditionObject::new("<", "70"));

        let numeric = ConditionObject::parse(r#"{"operator": ">=", "value": 20.5}"#).unwrap();
        assert_eq!(numeric.value, "20.5");

        let single = ConditionObject::parse("{'Operator': 'Contains', 'Value': 'IoT'}").unwrap();
        assert_eq!(single.operator, "Contains");

        assert!(ConditionObject::parse("{nonsense").is_none());
    }

    #[test]
    fn test_numeric_operators() {
        assert!(!ConditionObject::new("<", "70").evaluate("78"));
        assert!(ConditionObject::new(">", "70").evaluate("78"));
        assert!(ConditionObject::new(">=", "78").evaluate("78.0"));
        assert!(ConditionObject::new("<=", "78").evaluate(" 77 "));
        assert!(!ConditionObject::new(">", "70").evaluate("warm"));
    }

    #[test]
    fn test_equality() {
        assert!(ConditionObject::new("==", "77").evaluate("77.0"));
        assert!(ConditionObject::new("=", "RED").evaluate("RED"));
        assert!(!ConditionObject::new("==", "RED").evaluate("red"));
        assert!(!ConditionObject::new("==", "77").evaluate("seventy-seven"));
    }

    #[test]
    fn test_modulo_non_zero_matches() {
        assert!(!ConditionObject::new("%", "2").evaluate("80"));
        assert!(ConditionObject::new("%", "2").evaluate("81"));
        assert!(!ConditionObject::new("%", "0").evaluate("81"));
    }

    #[test]
    fn test_contains() {
        assert!(ConditionObject::new("contains", "IoT").evaluate("IoTZoo"));
        assert!(ConditionObject::new("Contains", "iot").evaluate("IoTZoo"));
        assert!(!ConditionObject::new("Contains not", "iot").evaluate("IoTZoo"));
        assert!(ConditionObject::new("CONTAINS NOT", "IoT").evaluate("Freudenreich"));
        assert!(!ConditionObject::new("Contains not", "Zoo").evaluate("IoTZoo"));
    }

    #[test]
    fn test_empty_or_unknown() {
        assert!(!ConditionObject::new("", "1").evaluate("1"));
        assert!(!ConditionObject::new("==", "").evaluate(""));
        assert!(!ConditionObject::new("~", "1").evaluate("1"));
    }

    #[test]
    fn test_list_any_matches() {
        let list = ConditionObject::parse_list(
            r#"[{"Operator":"==","Value":"RED"},{"Operator":"==","Value":"ORANGE"}]"#,
        )
        .unwrap();
        assert!(any_matches(&list, "ORANGE"));
        assert!(!any_matches(&list, "BLUE"));
    }
}
