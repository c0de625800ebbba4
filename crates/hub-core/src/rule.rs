//! Rules and their evaluation results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scalar::Scalar;
use crate::DEFAULT_RULE_PRIORITY;

/// When a rule is allowed to fire
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerCondition {
    /// Evaluate on every message for the source topic
    #[default]
    Always,
    /// Evaluate only when the payload differs from the previously cached one
    FireOnSourcePayloadChanged,
}

/// A source-topic-triggered condition/action pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique rule ID (ULID)
    pub id: String,

    #[serde(default)]
    pub namespace_name: String,

    pub project_name: String,

    /// Logical topic that triggers the rule
    pub source_topic: String,

    /// Logical topic the derived message is published to
    pub target_topic: String,

    /// Condition; empty means always true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,

    /// Template of the outbound payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_payload: Option<String>,

    #[serde(default)]
    pub trigger_condition: TriggerCondition,

    /// Evaluation order, 0 is highest
    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Publish delay; non-zero delays use toggle semantics
    #[serde(default)]
    pub delay_ms: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trigger_date_time: Option<DateTime<Utc>>,

    #[serde(default)]
    pub expression_evaluation_result: bool,

    /// Trace of the last evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression_evaluation_protocol: Option<String>,
}

fn default_priority() -> i32 {
    DEFAULT_RULE_PRIORITY
}

fn default_enabled() -> bool {
    true
}

impl Rule {
    /// Create an enabled rule with a fresh ID and default priority
    pub fn new(
        project_name: impl Into<String>,
        source_topic: impl Into<String>,
        target_topic: impl Into<String>,
    ) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            namespace_name: String::new(),
            project_name: project_name.into(),
            source_topic: source_topic.into(),
            target_topic: target_topic.into(),
            expression: None,
            target_payload: None,
            trigger_condition: TriggerCondition::Always,
            priority: DEFAULT_RULE_PRIORITY,
            enabled: true,
            delay_ms: 0,
            last_trigger_date_time: None,
            expression_evaluation_result: false,
            expression_evaluation_protocol: None,
        }
    }

    pub fn with_namespace(mut self, namespace_name: impl Into<String>) -> Self {
        self.namespace_name = namespace_name.into();
        self
    }

    pub fn with_expression(mut self, expression: impl Into<String>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    pub fn with_target_payload(mut self, target_payload: impl Into<String>) -> Self {
        self.target_payload = Some(target_payload.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_trigger_condition(mut self, trigger_condition: TriggerCondition) -> Self {
        self.trigger_condition = trigger_condition;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// `namespace/project/source_topic`
    pub fn source_topic_full_qualified(&self) -> String {
        format!(
            "{}/{}/{}",
            self.namespace_name, self.project_name, self.source_topic
        )
    }

    /// `namespace/project/target_topic`
    pub fn target_topic_full_qualified(&self) -> String {
        format!(
            "{}/{}/{}",
            self.namespace_name, self.project_name, self.target_topic
        )
    }

    /// Record an evaluation result on the rule
    pub fn record_evaluation(&mut self, result: &ExpressionEvaluationResult) {
        self.expression_evaluation_result = result.matches;
        self.expression_evaluation_protocol = Some(result.protocol.clone());
    }
}

/// Outcome of evaluating a rule condition
///
/// Every evaluation produces one, including the "no expression" case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionEvaluationResult {
    pub matches: bool,
    /// Human-readable trace of how the result was reached
    pub protocol: String,
    #[serde(default)]
    pub result: Option<Scalar>,
}

impl ExpressionEvaluationResult {
    pub fn positive(protocol: impl Into<String>) -> Self {
        Self {
            matches: true,
            protocol: protocol.into(),
            result: None,
        }
    }

    pub fn negative(protocol: impl Into<String>) -> Self {
        Self {
            matches: false,
            protocol: protocol.into(),
            result: None,
        }
    }

    /// Result derived from a scalar evaluator value
    pub fn from_scalar(expression: &str, value: Scalar) -> Self {
        Self {
            matches: value.is_truthy(),
            protocol: format!("{} ➔ {}", expression, value),
            result: Some(value),
        }
    }
}

impl Default for ExpressionEvaluationResult {
    fn default() -> Self {
        Self::negative(String::new())
    }
}
