//! Store interfaces consumed by the rule engine and router

use async_trait::async_trait;
use hub_core::{KnownMicrocontroller, KnownTopic, Rule, TopicHistory};
use thiserror::Error;

use crate::storage::StorageError;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid {entity}: {reason}")]
    Invalid {
        entity: &'static str,
        reason: String,
    },
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Supplies and persists rules
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Rules whose source topic equals `source_topic`, ordered by priority (0 first)
    async fn rules_by_source_topic(
        &self,
        project: &str,
        source_topic: &str,
        only_enabled: bool,
    ) -> StoreResult<Vec<Rule>>;

    async fn save(&self, rule: &Rule) -> StoreResult<()>;
}

/// Supplies and persists known topics and their history
#[async_trait]
pub trait KnownTopicStore: Send + Sync {
    /// Find a known topic
    ///
    /// With a project the topic must match exactly within that project.
    /// Without one, any project matches and `topic` may also be the
    /// fully-qualified topic; a fully-qualified match wins, then the lowest
    /// `project/topic`.
    async fn get_by_name(&self, project: Option<&str>, topic: &str)
        -> StoreResult<Option<KnownTopic>>;

    async fn save(&self, known_topic: &KnownTopic) -> StoreResult<()>;

    /// Record a payload; implementations may buffer writes to storage
    async fn append_history(&self, entry: TopicHistory) -> StoreResult<()>;
}

/// Supplies and persists registered microcontrollers
#[async_trait]
pub trait MicrocontrollerStore: Send + Sync {
    async fn get_by_mac(&self, mac_address: &str) -> StoreResult<Option<KnownMicrocontroller>>;

    async fn save(&self, microcontroller: &KnownMicrocontroller) -> StoreResult<()>;
}
