//! Recent-value cache for the IoT hub
//!
//! This crate provides the RecentValueCache, the rule engine's "working
//! memory": the most recently received payload per topic, bounded to a fixed
//! number of topics. Eviction is strict FIFO on insertion order; updating a
//! topic that is already cached keeps its position.

use hub_core::TopicEntry;
use indexmap::IndexMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, trace};

/// Default number of topics kept in the cache
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// What happened when an entry was put into the cache
#[derive(Debug, Clone, PartialEq)]
pub enum CacheUpdate {
    /// The topic was new and appended
    Inserted {
        /// Topic evicted to make room, if any
        evicted: Option<String>,
    },
    /// The topic was already cached and updated in place
    Updated {
        previous_payload: String,
        time_diff_ms: i64,
    },
}

/// Bounded map of the last-seen entry per topic
///
/// Keyed by the logical topic; lookups are exact, case-sensitive matches.
pub struct RecentValueCache {
    /// Entries in insertion order
    entries: Mutex<IndexMap<String, TopicEntry>>,
    capacity: usize,
}

impl RecentValueCache {
    /// Create a cache holding at most `capacity` topics
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(IndexMap::with_capacity(capacity + 1)),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, TopicEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Upsert an entry by topic
    ///
    /// An existing topic is updated in place, recording the previous payload
    /// and the time since the previous receipt. A new topic is appended and
    /// the oldest-inserted topic is evicted on overflow.
    #[instrument(skip(self, entry), fields(topic = %entry.topic))]
    pub fn put(&self, mut entry: TopicEntry) -> CacheUpdate {
        let mut entries = self.lock();

        if let Some(existing) = entries.get_mut(&entry.topic) {
            let previous_payload = std::mem::take(&mut existing.payload);
            let time_diff_ms = (entry.date_of_receipt - existing.date_of_receipt).num_milliseconds();

            existing.previous_payload = Some(previous_payload.clone());
            existing.payload = entry.payload;
            existing.time_diff_ms = Some(time_diff_ms);
            existing.date_of_receipt = entry.date_of_receipt;
            existing.message_direction = entry.message_direction;
            existing.retain = entry.retain;
            existing.qos = entry.qos;
            existing.is_known = entry.is_known;
            existing.sender = entry.sender;

            trace!(time_diff_ms, "Updated cached topic");
            return CacheUpdate::Updated {
                previous_payload,
                time_diff_ms,
            };
        }

        entry.previous_payload = None;
        entry.time_diff_ms = None;
        entries.insert(entry.topic.clone(), entry);

        let mut evicted = None;
        while entries.len() > self.capacity {
            if let Some((topic, _)) = entries.shift_remove_index(0) {
                debug!(evicted = %topic, "Evicted oldest cached topic");
                evicted = Some(topic);
            }
        }

        CacheUpdate::Inserted { evicted }
    }

    /// Get the cached payload of a topic
    pub fn get(&self, topic: &str) -> Option<String> {
        self.lock().get(topic).map(|e| e.payload.clone())
    }

    /// Get the full cached entry of a topic
    pub fn get_entry(&self, topic: &str) -> Option<TopicEntry> {
        self.lock().get(topic).cloned()
    }

    /// Get the entry whose `namespace/project/topic` equals `name`
    pub fn get_by_full_qualified_topic(&self, name: &str) -> Option<TopicEntry> {
        self.lock()
            .values()
            .find(|e| e.full_qualified_topic() == name)
            .cloned()
    }

    /// Look up a payload by topic, then by fully-qualified topic
    pub fn lookup(&self, name: &str) -> Option<String> {
        let entries = self.lock();
        if let Some(entry) = entries.get(name) {
            return Some(entry.payload.clone());
        }
        entries
            .values()
            .find(|e| e.full_qualified_topic() == name)
            .map(|e| e.payload.clone())
    }

    /// Cached topics, oldest first
    pub fn topics(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Snapshot of all entries, oldest first
    pub fn entries(&self) -> Vec<TopicEntry> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for RecentValueCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Thread-safe wrapper for RecentValueCache
pub type SharedRecentValueCache = Arc<RecentValueCache>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(topic: &str, payload: &str) -> TopicEntry {
        TopicEntry::new("home", "garden", topic, payload)
    }

    #[test]
    fn test_put_and_get() {
        let cache = RecentValueCache::default();
        assert_eq!(cache.capacity(), DEFAULT_CACHE_CAPACITY);

        cache.put(entry("Button1State", "1"));
        assert_eq!(cache.get("Button1State").as_deref(), Some("1"));
        assert!(cache.get("button1state").is_none());
    }

    #[test]
    fn test_update_in_place_keeps_position() {
        let cache = RecentValueCache::new(3);
        cache.put(entry("a", "1"));
        cache.put(entry("b", "1"));

        let mut update = entry("a", "2");
        update.date_of_receipt += Duration::milliseconds(250);
        let result = cache.put(update);

        match result {
            CacheUpdate::Updated {
                previous_payload,
                time_diff_ms,
            } => {
                assert_eq!(previous_payload, "1");
                assert!(time_diff_ms >= 250);
            }
            other => panic!("expected update, got {:?}", other),
        }

        assert_eq!(cache.topics(), vec!["a", "b"]);
        let cached = cache.get_entry("a").unwrap();
        assert_eq!(cached.payload, "2");
        assert_eq!(cached.previous_payload.as_deref(), Some("1"));
    }

    #[test]
    fn test_fifo_eviction_ignores_access_recency() {
        let cache = RecentValueCache::new(3);
        cache.put(entry("a", "1"));
        cache.put(entry("b", "2"));
        cache.put(entry("c", "3"));

        // Updating "a" does not make it younger
        cache.put(entry("a", "10"));
        let _ = cache.get("a");

        let result = cache.put(entry("d", "4"));
        assert_eq!(
            result,
            CacheUpdate::Inserted {
                evicted: Some("a".to_string())
            }
        );
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.topics(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_n_plus_one_inserts_evict_oldest() {
        let n = 10;
        let cache = RecentValueCache::new(n);
        for i in 0..=n {
            cache.put(entry(&format!("topic{}", i), "x"));
        }
        assert_eq!(cache.len(), n);
        assert!(cache.get("topic0").is_none());
        assert!(cache.get(&format!("topic{}", n)).is_some());
    }

    #[test]
    fn test_lookup_by_full_qualified_topic() {
        let cache = RecentValueCache::default();
        cache.put(entry("heatmap/index", "4"));

        assert_eq!(cache.lookup("heatmap/index").as_deref(), Some("4"));
        assert_eq!(
            cache.lookup("home/garden/heatmap/index").as_deref(),
            Some("4")
        );
        assert!(cache
            .get_by_full_qualified_topic("home/garden/heatmap/index")
            .is_some());
        assert!(cache.lookup("other/garden/heatmap/index").is_none());
    }
}
