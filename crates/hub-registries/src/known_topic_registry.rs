//! Known Topic Registry
//!
//! Tracks known topics per project and the payload history of topics that
//! keep one.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hub_core::{KnownTopic, TopicHistory};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::storage::{Storable, Storage, StorageResult};
use crate::store::{KnownTopicStore, StoreError, StoreResult};

/// Storage key for known topics
pub const STORAGE_KEY: &str = "hub.known_topics";
/// Storage key for topic history
pub const HISTORY_STORAGE_KEY: &str = "hub.topic_history";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Default number of history entries kept per topic
pub const DEFAULT_HISTORY_PER_TOPIC: usize = 1000;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnownTopicRegistryData {
    pub known_topics: Vec<KnownTopic>,
}

impl Storable for KnownTopicRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TopicHistoryData {
    pub entries: Vec<TopicHistory>,
}

impl Storable for TopicHistoryData {
    const KEY: &'static str = HISTORY_STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

fn registry_key(project: &str, topic: &str) -> String {
    format!("{}/{}", project, topic)
}

/// Known Topic Registry
pub struct KnownTopicRegistry {
    storage: Option<Arc<Storage>>,

    /// Primary index: "project/topic" -> KnownTopic
    by_key: DashMap<String, Arc<KnownTopic>>,

    /// History per "project/topic", oldest first
    history: DashMap<String, VecDeque<TopicHistory>>,

    history_per_topic: usize,

    /// History changed since the last flush
    history_dirty: AtomicBool,
}

impl KnownTopicRegistry {
    /// Create a registry persisted to `storage`
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage: Some(storage),
            by_key: DashMap::new(),
            history: DashMap::new(),
            history_per_topic: DEFAULT_HISTORY_PER_TOPIC,
            history_dirty: AtomicBool::new(false),
        }
    }

    /// Create a registry without persistence
    pub fn in_memory() -> Self {
        Self {
            storage: None,
            by_key: DashMap::new(),
            history: DashMap::new(),
            history_per_topic: DEFAULT_HISTORY_PER_TOPIC,
            history_dirty: AtomicBool::new(false),
        }
    }

    /// Limit the number of history entries kept per topic
    pub fn with_history_limit(mut self, history_per_topic: usize) -> Self {
        self.history_per_topic = history_per_topic.max(1);
        self
    }

    /// Load known topics and history from storage
    pub async fn load(&self) -> StorageResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };

        if let Some(data) = storage.load::<KnownTopicRegistryData>().await? {
            info!("Loading {} known topics from storage", data.known_topics.len());
            for topic in data.known_topics {
                self.insert(topic);
            }
        }

        if let Some(data) = storage.load::<TopicHistoryData>().await? {
            debug!("Loading {} topic history entries", data.entries.len());
            for entry in data.entries {
                self.push_history(entry);
            }
        }
        Ok(())
    }

    /// Write all known topics to storage
    pub async fn persist(&self) -> StorageResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let mut known_topics: Vec<KnownTopic> =
            self.by_key.iter().map(|r| (**r.value()).clone()).collect();
        known_topics.sort_by(|a, b| {
            registry_key(&a.project_name, &a.topic).cmp(&registry_key(&b.project_name, &b.topic))
        });
        storage.save(&KnownTopicRegistryData { known_topics }).await?;
        debug!("Saved {} known topics to storage", self.by_key.len());
        Ok(())
    }

    /// Write topic history to storage if it changed since the last flush
    ///
    /// History is only kept in memory by [`KnownTopicStore::append_history`];
    /// call this periodically and on shutdown.
    pub async fn flush_history(&self) -> StorageResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        if !self.history_dirty.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut entries: Vec<TopicHistory> = self
            .history
            .iter()
            .flat_map(|r| r.value().iter().cloned().collect::<Vec<_>>())
            .collect();
        entries.sort_by_key(|e| e.date_received);
        debug!("Saving {} topic history entries", entries.len());
        if let Err(e) = storage.save(&TopicHistoryData { entries }).await {
            self.history_dirty.store(true, Ordering::SeqCst);
            return Err(e);
        }
        Ok(())
    }

    /// Insert or replace a known topic without persisting
    pub fn insert(&self, known_topic: KnownTopic) -> Arc<KnownTopic> {
        let key = registry_key(&known_topic.project_name, &known_topic.topic);
        let entry = Arc::new(known_topic);
        self.by_key.insert(key, Arc::clone(&entry));
        entry
    }

    fn push_history(&self, entry: TopicHistory) {
        let key = registry_key(&entry.project_name, &entry.topic);
        let mut history = self.history.entry(key).or_default();
        history.push_back(entry);
        while history.len() > self.history_per_topic {
            history.pop_front();
        }
    }

    pub fn get(&self, project: &str, topic: &str) -> Option<Arc<KnownTopic>> {
        self.by_key
            .get(&registry_key(project, topic))
            .map(|r| Arc::clone(r.value()))
    }

    /// History of a topic, oldest first
    pub fn history(&self, project: &str, topic: &str) -> Vec<TopicHistory> {
        self.history
            .get(&registry_key(project, topic))
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn remove(&self, project: &str, topic: &str) -> Option<Arc<KnownTopic>> {
        self.by_key
            .remove(&registry_key(project, topic))
            .map(|(_, t)| t)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<KnownTopic>> + '_ {
        self.by_key.iter().map(|r| Arc::clone(r.value()))
    }
}

#[async_trait]
impl KnownTopicStore for KnownTopicRegistry {
    async fn get_by_name(
        &self,
        project: Option<&str>,
        topic: &str,
    ) -> StoreResult<Option<KnownTopic>> {
        if let Some(project) = project {
            return Ok(self.get(project, topic).map(|t| (*t).clone()));
        }

        // A fully-qualified match wins over a bare topic name; ties go to the
        // lowest "project/topic" key.
        let found = self
            .by_key
            .iter()
            .filter_map(|r| {
                let known_topic = r.value();
                let rank = if known_topic.full_qualified_topic() == topic {
                    0
                } else if known_topic.topic == topic {
                    1
                } else {
                    return None;
                };
                Some((rank, r.key().clone(), Arc::clone(known_topic)))
            })
            .min_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)))
            .map(|(_, _, known_topic)| (*known_topic).clone());
        Ok(found)
    }

    async fn save(&self, known_topic: &KnownTopic) -> StoreResult<()> {
        if known_topic.topic.is_empty() {
            return Err(StoreError::Invalid {
                entity: "known topic",
                reason: "topic cannot be empty".to_string(),
            });
        }
        trace!(topic = %known_topic.topic, "Saving known topic");
        self.insert(known_topic.clone());
        self.persist().await?;
        Ok(())
    }

    async fn append_history(&self, entry: TopicHistory) -> StoreResult<()> {
        self.push_history(entry);
        self.history_dirty.store(true, Ordering::SeqCst);
        Ok(())
    }
}
