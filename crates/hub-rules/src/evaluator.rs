//! Rule condition evaluation
//!
//! An expression is one of:
//!
//! - empty: always matches
//! - segments joined by ` && ` / ` and ` (all must match) or
//!   ` || ` / ` or ` (any must match), evaluated left to right and
//!   short-circuiting
//! - a JSON path comparison against a JSON payload: `$['t'] < 55`
//! - a condition object or a list of them: `{"Operator": ">", "Value": 5}`
//! - arithmetic/boolean text with `input`, read markers, bare topic names
//!   and script calls substituted before scalar evaluation: `input > 5`
//!
//! Every evaluation returns an [`ExpressionEvaluationResult`] with a
//! protocol describing how the result was reached.

use std::sync::Arc;

use hub_core::ExpressionEvaluationResult;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::calculator::ScalarEvaluator;
use crate::conditions::{self, ConditionObject};
use crate::error::RuleResult;
use crate::jsonpath::{self, JSON_PATH_MARKER};
use crate::scripts::ScriptResolver;
use crate::text::{replace_input, split_any};
use crate::variables::VariableResolver;

const AND_SEPARATORS: &[&str] = &[" && ", " and "];
const OR_SEPARATORS: &[&str] = &[" || ", " or "];

/// Protocol of an empty expression
pub const NO_EXPRESSION_PROTOCOL: &str = "no expressions ➔ treat as positive evaluated";

/// Evaluates rule conditions against inbound payloads
#[derive(Clone)]
pub struct ExpressionEvaluator {
    variables: VariableResolver,
    scripts: ScriptResolver,
    calculator: Arc<dyn ScalarEvaluator>,
}

impl ExpressionEvaluator {
    pub fn new(
        variables: VariableResolver,
        scripts: ScriptResolver,
        calculator: Arc<dyn ScalarEvaluator>,
    ) -> Self {
        Self {
            variables,
            scripts,
            calculator,
        }
    }

    /// Evaluate `expression` against `payload`
    ///
    /// Malformed expressions evaluate as non-matching. Only script failures
    /// are returned as errors.
    #[instrument(skip(self, payload), level = "debug")]
    pub async fn evaluate(
        &self,
        expression: Option<&str>,
        payload: &str,
    ) -> RuleResult<ExpressionEvaluationResult> {
        let expression = match expression.map(str::trim) {
            Some(e) if !e.is_empty() => e,
            _ => return Ok(ExpressionEvaluationResult::positive(NO_EXPRESSION_PROTOCOL)),
        };

        if let Some(segments) = split_any(expression, AND_SEPARATORS) {
            let mut protocol = String::new();
            for segment in segments {
                let result = self.evaluate_single(segment, payload).await?;
                protocol.push_str(&result.protocol);
                protocol.push('\n');
                if !result.matches {
                    return Ok(ExpressionEvaluationResult::negative(protocol));
                }
            }
            return Ok(ExpressionEvaluationResult::positive(protocol));
        }

        if let Some(segments) = split_any(expression, OR_SEPARATORS) {
            let mut protocol = String::new();
            for segment in segments {
                let result = self.evaluate_single(segment, payload).await?;
                protocol.push_str(&result.protocol);
                protocol.push('\n');
                if result.matches {
                    return Ok(ExpressionEvaluationResult::positive(protocol));
                }
            }
            return Ok(ExpressionEvaluationResult::negative(protocol));
        }

        self.evaluate_single(expression, payload).await
    }

    async fn evaluate_single(
        &self,
        expression: &str,
        payload: &str,
    ) -> RuleResult<ExpressionEvaluationResult> {
        if expression.is_empty() {
            return Ok(ExpressionEvaluationResult::positive(NO_EXPRESSION_PROTOCOL));
        }

        let resolved = if expression.contains(JSON_PATH_MARKER) {
            substitute_json_path(expression, payload)
        } else if expression.starts_with('[') {
            return Ok(evaluate_condition_list(expression, payload));
        } else if expression.starts_with('{') {
            return Ok(evaluate_condition(expression, payload));
        } else {
            let text = replace_input(expression, payload);
            let text = self.variables.resolve(&text).await;
            self.scripts.resolve(&text).await?
        };

        Ok(match self.calculator.evaluate(&resolved).await {
            Ok(value) => {
                debug!(expression = %resolved, result = %value, "Evaluated expression");
                ExpressionEvaluationResult::from_scalar(&resolved, value)
            }
            Err(e) => {
                debug!(expression = %resolved, error = %e, "Expression did not evaluate");
                ExpressionEvaluationResult::negative(format!("{} ➔ {}", resolved, e))
            }
        })
    }
}

/// Replace the JSON path in `expression` with its first match in `payload`
///
/// Numbers are inserted as is, everything else single-quoted. The expression
/// is returned unchanged when the path does not match.
fn substitute_json_path(expression: &str, payload: &str) -> String {
    let Some(span) = jsonpath::json_path_span(expression) else {
        return expression.to_string();
    };

    let Some(value) = jsonpath::first_match(&expression[span.clone()], payload) else {
        debug!(path = &expression[span], "JSON path did not match payload");
        return expression.to_string();
    };

    let literal = match &value {
        Value::Number(n) => n.to_string(),
        other => {
            let text = jsonpath::value_to_text(other);
            if text.trim().parse::<f64>().is_ok() {
                text
            } else {
                format!("'{}'", text)
            }
        }
    };

    let mut resolved = expression.to_string();
    resolved.replace_range(span, &literal);
    resolved
}

fn evaluate_condition(expression: &str, payload: &str) -> ExpressionEvaluationResult {
    let Some(condition) = ConditionObject::parse(expression) else {
        return ExpressionEvaluationResult::negative(format!("{} ➔ invalid condition", expression));
    };

    let protocol = format!("{} {} ➔ ", condition.operator, condition.value);
    if condition.evaluate(payload) {
        ExpressionEvaluationResult::positive(protocol + "matches")
    } else {
        ExpressionEvaluationResult::negative(protocol + "no match")
    }
}

fn evaluate_condition_list(expression: &str, payload: &str) -> ExpressionEvaluationResult {
    match ConditionObject::parse_list(expression) {
        Some(list) if conditions::any_matches(&list, payload) => {
            ExpressionEvaluationResult::positive("at least one matches")
        }
        _ => ExpressionEvaluationResult::negative("no match"),
    }
}
