//! Per-message routing: bookkeeping, default topics, rules, cache

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use hub_core::topics::is_i_am_lost;
use hub_core::{
    full_qualified_topic, ExpressionEvaluationResult, InboundMessage, OutboundMessage, Rule,
    TopicEntry, TopicHistory, TopicPath, TriggerCondition,
};
use hub_event_bus::Publisher;
use hub_registries::{KnownTopicStore, MicrocontrollerStore, Registries, RuleStore};
use hub_rules::RuleEngine;
use hub_topic_cache::SharedRecentValueCache;
use tracing::{debug, error, instrument, trace, warn};

use crate::default_topics::DefaultTopicHandlers;
use crate::scheduler::{DelayedPublishScheduler, ScheduleOutcome};

/// Protocol recorded on rules skipped because their source payload did not change
pub const NO_DATA_CHANGE: &str = "no data change";

/// Skip reason for matching rules without a target payload
pub const NO_TARGET_PAYLOAD: &str = "no target payload";

/// The stores the router reads and writes
#[derive(Clone)]
pub struct RouterStores {
    pub rules: Arc<dyn RuleStore>,
    pub known_topics: Arc<dyn KnownTopicStore>,
    pub microcontrollers: Arc<dyn MicrocontrollerStore>,
}

impl From<&Registries> for RouterStores {
    fn from(registries: &Registries) -> Self {
        Self {
            rules: registries.rules.clone(),
            known_topics: registries.known_topics.clone(),
            microcontrollers: registries.microcontrollers.clone(),
        }
    }
}

/// What happened to one rule
#[derive(Debug, Clone, PartialEq)]
pub enum RuleStatus {
    /// Not evaluated
    Skipped(String),
    NotMatched,
    Published(OutboundMessage),
    /// Will be published once the rule's delay expires
    Armed(OutboundMessage),
    /// Switched off an identical pending publish
    Cancelled(OutboundMessage),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub rule_id: String,
    pub status: RuleStatus,
}

/// What happened to one inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Ignored { reason: String },
    /// Handled as a control topic
    Control,
    Routed {
        entry: TopicEntry,
        rules: Vec<RuleOutcome>,
    },
}

impl MessageOutcome {
    /// Rule outcomes of a routed message, empty otherwise
    pub fn rules(&self) -> &[RuleOutcome] {
        match self {
            Self::Routed { rules, .. } => rules,
            _ => &[],
        }
    }
}

/// Routes inbound messages through the rules
pub struct MessageRouter {
    namespace: String,
    cache: SharedRecentValueCache,
    stores: RouterStores,
    engine: RuleEngine,
    default_topics: DefaultTopicHandlers,
    scheduler: DelayedPublishScheduler,
}

impl MessageRouter {
    pub fn new(
        namespace: impl Into<String>,
        cache: SharedRecentValueCache,
        stores: RouterStores,
        engine: RuleEngine,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        let namespace = namespace.into();
        let default_topics = DefaultTopicHandlers::new(
            namespace.clone(),
            stores.known_topics.clone(),
            stores.microcontrollers.clone(),
            publisher.clone(),
        );

        Self {
            namespace,
            cache,
            stores,
            engine,
            default_topics,
            scheduler: DelayedPublishScheduler::new(publisher),
        }
    }

    /// Broker address handed to microcontrollers that get recreated
    pub fn with_broker_host(mut self, broker_host: impl Into<String>) -> Self {
        self.default_topics = self.default_topics.with_broker_host(broker_host);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn scheduler(&self) -> &DelayedPublishScheduler {
        &self.scheduler
    }

    /// Route one inbound message
    ///
    /// Failures are logged and reported in the outcome; they never stop
    /// the remaining rules.
    #[instrument(skip(self, message), fields(topic = %message.topic))]
    pub async fn handle(&self, message: &InboundMessage) -> MessageOutcome {
        if is_i_am_lost(&message.topic) {
            if let Err(e) = self.default_topics.handle_i_am_lost(&message.payload).await {
                warn!(error = %e, "Control message failed");
            }
            return MessageOutcome::Control;
        }

        let path = match TopicPath::parse(&message.topic) {
            Ok(path) => path,
            Err(e) => {
                trace!(error = %e, "Ignoring message");
                return MessageOutcome::Ignored {
                    reason: e.to_string(),
                };
            }
        };
        if path.namespace != self.namespace {
            return MessageOutcome::Ignored {
                reason: format!("namespace '{}' is not '{}'", path.namespace, self.namespace),
            };
        }

        let mut entry = TopicEntry::from_message(path, message);
        self.track_known_topic(&mut entry).await;

        if let Err(e) = self.default_topics.handle(&entry).await {
            warn!(error = %e, "Default topic handler failed");
        }

        let previous_payload = self.cache.get(&entry.topic);
        let rules = match self
            .stores
            .rules
            .rules_by_source_topic(&entry.project_name, &entry.topic, true)
            .await
        {
            Ok(rules) => rules,
            Err(e) => {
                error!(error = %e, "Failed to load rules");
                Vec::new()
            }
        };

        let mut outcomes = Vec::with_capacity(rules.len());
        for rule in rules {
            let rule_id = rule.id.clone();
            let status = self.apply_rule(rule, &entry, previous_payload.as_deref()).await;
            debug!(rule_id = %rule_id, status = ?status, "Rule processed");
            outcomes.push(RuleOutcome { rule_id, status });
        }

        self.cache.put(entry.clone());

        MessageOutcome::Routed {
            entry,
            rules: outcomes,
        }
    }

    /// Update the known topic of the entry, if there is one
    async fn track_known_topic(&self, entry: &mut TopicEntry) {
        let mut known = match self
            .stores
            .known_topics
            .get_by_name(Some(&entry.project_name), &entry.topic)
            .await
        {
            Ok(Some(known)) => known,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Known topic lookup failed");
                return;
            }
        };

        entry.is_known = true;
        entry.description = known.description.clone();
        entry.message_direction = known.message_direction;

        if known.keep_history {
            let history = TopicHistory::new(
                &entry.project_name,
                &entry.topic,
                Some(entry.payload.clone()),
            );
            if let Err(e) = self.stores.known_topics.append_history(history).await {
                warn!(error = %e, "Failed to append topic history");
            }
        }

        known.last_payload = Some(entry.payload.clone());
        known.payload_updated_at = Some(entry.date_of_receipt);
        known.retained = Some(entry.retain);
        if entry.sender.is_some() {
            known.sender = entry.sender.clone();
        }

        if let Err(e) = self.stores.known_topics.save(&known).await {
            warn!(error = %e, "Failed to save known topic");
        }
    }

    async fn apply_rule(
        &self,
        mut rule: Rule,
        entry: &TopicEntry,
        previous_payload: Option<&str>,
    ) -> RuleStatus {
        if rule.trigger_condition == TriggerCondition::FireOnSourcePayloadChanged
            && previous_payload == Some(entry.payload.as_str())
        {
            rule.record_evaluation(&ExpressionEvaluationResult::negative(NO_DATA_CHANGE));
            self.save_rule(&rule).await;
            return RuleStatus::Skipped(NO_DATA_CHANGE.to_string());
        }

        let result = match self.engine.evaluate(&rule, &entry.payload).await {
            Ok(result) => result,
            Err(e) => {
                let expression = rule.expression.clone().unwrap_or_default();
                rule.record_evaluation(&ExpressionEvaluationResult::negative(format!(
                    "{} ➔ {}",
                    expression, e
                )));
                self.save_rule(&rule).await;
                return RuleStatus::Failed(e.to_string());
            }
        };
        rule.record_evaluation(&result);

        let status = if result.matches {
            self.trigger(&mut rule, entry).await
        } else {
            RuleStatus::NotMatched
        };

        self.save_rule(&rule).await;
        status
    }

    /// Resolve the target payload and publish or schedule it
    async fn trigger(&self, rule: &mut Rule, entry: &TopicEntry) -> RuleStatus {
        let payload = match self.engine.target_payload(rule, &entry.payload).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return RuleStatus::Skipped(NO_TARGET_PAYLOAD.to_string()),
            Err(e) => return RuleStatus::Failed(e.to_string()),
        };

        let namespace = if rule.namespace_name.is_empty() {
            self.namespace.as_str()
        } else {
            rule.namespace_name.as_str()
        };
        let topic = full_qualified_topic(namespace, &rule.project_name, &rule.target_topic);
        let message = OutboundMessage::new(topic, payload);

        match self
            .scheduler
            .schedule(message.clone(), Duration::from_millis(rule.delay_ms))
            .await
        {
            Ok(ScheduleOutcome::Published) => {
                rule.last_trigger_date_time = Some(Utc::now());
                RuleStatus::Published(message)
            }
            Ok(ScheduleOutcome::Armed) => RuleStatus::Armed(message),
            Ok(ScheduleOutcome::Cancelled) => {
                rule.last_trigger_date_time = Some(Utc::now());
                RuleStatus::Cancelled(message)
            }
            Err(e) => RuleStatus::Failed(e.to_string()),
        }
    }

    async fn save_rule(&self, rule: &Rule) {
        if let Err(e) = self.stores.rules.save(rule).await {
            warn!(rule_id = %rule.id, error = %e, "Failed to save rule");
        }
    }
}
