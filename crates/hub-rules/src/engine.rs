//! Rule engine facade over the evaluator and the payload resolver

use std::sync::Arc;

use hub_core::{ExpressionEvaluationResult, Rule};
use hub_registries::KnownTopicStore;
use hub_topic_cache::SharedRecentValueCache;

use crate::calculator::{ScalarEvaluator, SqliteCalculator};
use crate::error::RuleResult;
use crate::evaluator::ExpressionEvaluator;
use crate::payload::PayloadResolver;
use crate::rhai_engine::ScriptEngine;
use crate::scripts::ScriptResolver;
use crate::variables::VariableResolver;

/// Evaluates rules against inbound payloads
///
/// Condition evaluation and payload resolution share one cache, one
/// known-topic store, one scalar evaluator and one script engine.
#[derive(Clone)]
pub struct RuleEngine {
    evaluator: ExpressionEvaluator,
    payloads: PayloadResolver,
}

impl RuleEngine {
    pub fn new(
        cache: SharedRecentValueCache,
        known_topics: Arc<dyn KnownTopicStore>,
        calculator: Arc<dyn ScalarEvaluator>,
        scripts: Arc<dyn ScriptEngine>,
    ) -> Self {
        let variables = VariableResolver::new(cache, known_topics);
        let scripts = ScriptResolver::new(scripts);

        Self {
            evaluator: ExpressionEvaluator::new(
                variables.clone(),
                scripts.clone(),
                Arc::clone(&calculator),
            ),
            payloads: PayloadResolver::new(variables, scripts, calculator),
        }
    }

    /// Engine with the SQLite scalar evaluator
    pub fn with_sqlite(
        cache: SharedRecentValueCache,
        known_topics: Arc<dyn KnownTopicStore>,
        scripts: Arc<dyn ScriptEngine>,
    ) -> RuleResult<Self> {
        let calculator = Arc::new(SqliteCalculator::new()?);
        Ok(Self::new(cache, known_topics, calculator, scripts))
    }

    /// Evaluate the rule's condition against `payload`
    pub async fn evaluate(&self, rule: &Rule, payload: &str) -> RuleResult<ExpressionEvaluationResult> {
        self.evaluator
            .evaluate(rule.expression.as_deref(), payload)
            .await
    }

    /// Compute the rule's outbound payload for `payload`
    pub async fn target_payload(&self, rule: &Rule, payload: &str) -> RuleResult<Option<String>> {
        self.payloads
            .resolve(rule.target_payload.as_deref(), payload)
            .await
    }

    pub fn evaluator(&self) -> &ExpressionEvaluator {
        &self.evaluator
    }

    pub fn payloads(&self) -> &PayloadResolver {
        &self.payloads
    }
}
