//! IoT hub registries
//!
//! This crate provides the stores the rule engine and router consume:
//! - Rules (RuleRegistry)
//! - Known topics and their history (KnownTopicRegistry)
//! - Microcontrollers (MicrocontrollerRegistry)
//!
//! Registries are DashMap-backed and, when given a [`Storage`], persist to
//! versioned JSON files in the storage directory.

pub mod storage;
pub mod store;

pub mod known_topic_registry;
pub mod microcontroller_registry;
pub mod rule_registry;

pub use storage::{Storable, Storage, StorageError, StorageFile, StorageResult};
pub use store::{KnownTopicStore, MicrocontrollerStore, RuleStore, StoreError, StoreResult};

pub use known_topic_registry::{KnownTopicRegistry, DEFAULT_HISTORY_PER_TOPIC};
pub use microcontroller_registry::MicrocontrollerRegistry;
pub use rule_registry::RuleRegistry;

use std::sync::Arc;

/// All registries bundled together
pub struct Registries {
    pub storage: Option<Arc<Storage>>,
    pub rules: Arc<RuleRegistry>,
    pub known_topics: Arc<KnownTopicRegistry>,
    pub microcontrollers: Arc<MicrocontrollerRegistry>,
}

impl Registries {
    /// Create registries persisted in `storage_dir`
    pub fn new(storage_dir: impl AsRef<std::path::Path>, history_per_topic: usize) -> Self {
        let storage = Arc::new(Storage::new(storage_dir));

        Self {
            rules: Arc::new(RuleRegistry::new(storage.clone())),
            known_topics: Arc::new(
                KnownTopicRegistry::new(storage.clone()).with_history_limit(history_per_topic),
            ),
            microcontrollers: Arc::new(MicrocontrollerRegistry::new(storage.clone())),
            storage: Some(storage),
        }
    }

    /// Create registries without persistence
    pub fn in_memory() -> Self {
        Self {
            storage: None,
            rules: Arc::new(RuleRegistry::in_memory()),
            known_topics: Arc::new(KnownTopicRegistry::in_memory()),
            microcontrollers: Arc::new(MicrocontrollerRegistry::in_memory()),
        }
    }

    /// Load all registries from storage
    pub async fn load_all(&self) -> StorageResult<()> {
        self.rules.load().await?;
        self.known_topics.load().await?;
        self.microcontrollers.load().await?;
        Ok(())
    }

    /// Save all registries to storage
    pub async fn persist_all(&self) -> StorageResult<()> {
        self.rules.persist().await?;
        self.known_topics.persist().await?;
        self.known_topics.flush_history().await?;
        self.microcontrollers.persist().await?;
        Ok(())
    }
}
