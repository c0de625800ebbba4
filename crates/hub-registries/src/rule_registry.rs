//! Rule Registry
//!
//! Tracks all rules, keyed by rule ID.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use hub_core::Rule;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::storage::{Storable, Storage, StorageResult};
use crate::store::{RuleStore, StoreError, StoreResult};

/// Storage key for the rule registry
pub const STORAGE_KEY: &str = "hub.rules";
/// Current storage version
pub const STORAGE_VERSION: u32 = 1;
/// Current minor version
pub const STORAGE_MINOR_VERSION: u32 = 1;

/// Rule registry data for storage
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleRegistryData {
    pub rules: Vec<Rule>,
}

impl Storable for RuleRegistryData {
    const KEY: &'static str = STORAGE_KEY;
    const VERSION: u32 = STORAGE_VERSION;
    const MINOR_VERSION: u32 = STORAGE_MINOR_VERSION;
}

/// Rule Registry
///
/// Entries are stored as `Arc<Rule>` to avoid cloning on reads. Without a
/// storage backend the registry is purely in-memory.
pub struct RuleRegistry {
    storage: Option<Arc<Storage>>,
    by_id: DashMap<String, Arc<Rule>>,
}

impl RuleRegistry {
    /// Create a registry persisted to `storage`
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage: Some(storage),
            by_id: DashMap::new(),
        }
    }

    /// Create a registry without persistence
    pub fn in_memory() -> Self {
        Self {
            storage: None,
            by_id: DashMap::new(),
        }
    }

    /// Load from storage
    pub async fn load(&self) -> StorageResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        if let Some(data) = storage.load::<RuleRegistryData>().await? {
            info!("Loading {} rules from storage", data.rules.len());
            for rule in data.rules {
                self.by_id.insert(rule.id.clone(), Arc::new(rule));
            }
        }
        Ok(())
    }

    /// Write all rules to storage
    pub async fn persist(&self) -> StorageResult<()> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        let mut rules: Vec<Rule> = self.by_id.iter().map(|r| (**r.value()).clone()).collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        storage.save(&RuleRegistryData { rules }).await?;
        debug!("Saved {} rules to storage", self.by_id.len());
        Ok(())
    }

    /// Insert or replace a rule without persisting
    pub fn insert(&self, rule: Rule) -> Arc<Rule> {
        let rule = Arc::new(rule);
        self.by_id.insert(rule.id.clone(), Arc::clone(&rule));
        rule
    }

    pub fn get(&self, rule_id: &str) -> Option<Arc<Rule>> {
        self.by_id.get(rule_id).map(|r| Arc::clone(r.value()))
    }

    pub fn remove(&self, rule_id: &str) -> Option<Arc<Rule>> {
        self.by_id.remove(rule_id).map(|(_, rule)| {
            info!("Removed rule: {}", rule_id);
            rule
        })
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Arc<Rule>> + '_ {
        self.by_id.iter().map(|r| Arc::clone(r.value()))
    }
}

#[async_trait]
impl RuleStore for RuleRegistry {
    async fn rules_by_source_topic(
        &self,
        project: &str,
        source_topic: &str,
        only_enabled: bool,
    ) -> StoreResult<Vec<Rule>> {
        let mut rules: Vec<Rule> = self
            .by_id
            .iter()
            .filter(|r| {
                let rule = r.value();
                rule.project_name == project
                    && rule.source_topic == source_topic
                    && (!only_enabled || rule.enabled)
            })
            .map(|r| (**r.value()).clone())
            .collect();

        // ULIDs sort by creation time, so ties keep creation order
        rules.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.id.cmp(&b.id)));
        Ok(rules)
    }

    async fn save(&self, rule: &Rule) -> StoreResult<()> {
        if rule.id.is_empty() {
            return Err(StoreError::Invalid {
                entity: "rule",
                reason: "rule id cannot be empty".to_string(),
            });
        }
        self.insert(rule.clone());
        self.persist().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_rules_ordered_by_priority() {
        let registry = RuleRegistry::in_memory();
        registry.insert(Rule::new("p", "button", "a").with_priority(7));
        registry.insert(Rule::new("p", "button", "b").with_priority(0));
        registry.insert(Rule::new("p", "button", "c").with_priority(3));
        registry.insert(Rule::new("p", "other", "d").with_priority(0));
        registry.insert(Rule::new("q", "button", "e").with_priority(0));

        let rules = registry
            .rules_by_source_topic("p", "button", true)
            .await
            .unwrap();
        let targets: Vec<_> = rules.iter().map(|r| r.target_topic.as_str()).collect();
        assert_eq!(targets, vec!["b", "c", "a"]);
    }

    #[tokio::test]
    async fn test_only_enabled_filter() {
        let registry = RuleRegistry::in_memory();
        registry.insert(Rule::new("p", "t", "on"));
        registry.insert(Rule::new("p", "t", "off").with_enabled(false));

        let enabled = registry.rules_by_source_topic("p", "t", true).await.unwrap();
        assert_eq!(enabled.len(), 1);
        let all = registry.rules_by_source_topic("p", "t", false).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_save_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::new(dir.path()));
        let registry = RuleRegistry::new(storage.clone());

        let mut rule = Rule::new("p", "t", "lamp").with_expression("input > 5");
        rule.expression_evaluation_protocol = Some("7 > 5 ➔ 1".to_string());
        registry.save(&rule).await.unwrap();

        let reloaded = RuleRegistry::new(storage);
        reloaded.load().await.unwrap();
        let loaded = reloaded.get(&rule.id).unwrap();
        assert_eq!(*loaded, rule);
    }

    #[tokio::test]
    async fn test_save_rejects_empty_id() {
        let registry = RuleRegistry::in_memory();
        let mut rule = Rule::new("p", "t", "x");
        rule.id.clear();
        assert!(matches!(
            registry.save(&rule).await,
            Err(StoreError::Invalid { entity: "rule", .. })
        ));
    }
}
