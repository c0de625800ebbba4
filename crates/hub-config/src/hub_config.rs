//! Hub configuration
//!
//! Parses `configuration.yaml`:
//!
//! ```yaml
//! namespace: iotzoo
//! projects: [garden]
//! broker:
//!   host: localhost
//!   password: !secret mqtt_password
//! rules: !include_dir_merge_list rules
//! ```

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use hub_core::{KnownTopic, MessageDirection, Rule, TriggerCondition, DEFAULT_RULE_PRIORITY};

use crate::error::{ConfigError, ConfigResult};
use crate::loader::load_yaml;

/// Name of the main configuration file inside the config directory
pub const CONFIG_FILE: &str = "configuration.yaml";

/// Prefix of the ids given to configured rules without an explicit `id`
pub const DERIVED_RULE_ID_PREFIX: &str = "config:";

/// MQTT broker connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_broker_host")]
    pub host: String,

    #[serde(default = "default_broker_port")]
    pub port: u16,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_broker_host() -> String {
    "localhost".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "iot-hub".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: default_broker_host(),
            port: default_broker_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive_secs(),
        }
    }
}

/// Recent-value cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
}

fn default_cache_capacity() -> usize {
    200
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
        }
    }
}

/// Persistence settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage directory, relative paths resolve against the config directory
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,

    /// History entries kept per topic
    #[serde(default = "default_history_per_topic")]
    pub history_per_topic: usize,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".storage")
}

fn default_history_per_topic() -> usize {
    1000
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
            history_per_topic: default_history_per_topic(),
        }
    }
}

/// A named Rhai script callable from rules with `::name(arg)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    pub name: String,
    /// Rhai source; must define a function named like the script
    pub source: String,
}

/// A known topic declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownTopicConfig {
    pub project: String,
    pub topic: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub direction: MessageDirection,

    #[serde(default)]
    pub keep_history: bool,
}

impl KnownTopicConfig {
    pub fn to_known_topic(&self, namespace: &str) -> KnownTopic {
        let mut known_topic = KnownTopic::new(&self.project, &self.topic)
            .with_namespace(namespace)
            .with_direction(self.direction)
            .with_history(self.keep_history);
        known_topic.description = self.description.clone();
        known_topic
    }
}

/// A rule declared in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Stable id; rules without one get an id derived from project, topics
    /// and priority
    #[serde(default)]
    pub id: Option<String>,

    pub project: String,
    pub source_topic: String,
    pub target_topic: String,

    #[serde(default)]
    pub expression: Option<String>,

    #[serde(default)]
    pub target_payload: Option<String>,

    #[serde(default)]
    pub trigger_condition: TriggerCondition,

    #[serde(default = "default_priority")]
    pub priority: i32,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub delay_ms: u64,
}

fn default_priority() -> i32 {
    DEFAULT_RULE_PRIORITY
}

fn default_enabled() -> bool {
    true
}

impl RuleConfig {
    /// The configured id, or `config:project/source/target/priority`
    pub fn rule_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => format!(
                "{}{}/{}/{}/{}",
                DERIVED_RULE_ID_PREFIX,
                self.project,
                self.source_topic,
                self.target_topic,
                self.priority
            ),
        }
    }

    pub fn to_rule(&self, namespace: &str) -> Rule {
        let mut rule = Rule::new(&self.project, &self.source_topic, &self.target_topic)
            .with_namespace(namespace)
            .with_trigger_condition(self.trigger_condition)
            .with_priority(self.priority)
            .with_enabled(self.enabled)
            .with_delay_ms(self.delay_ms);
        rule.id = self.rule_id();
        rule.expression = self.expression.clone();
        rule.target_payload = self.target_payload.clone();
        rule
    }
}

/// Complete hub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    /// First path segment of every topic the hub handles
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Projects whose topics are subscribed
    #[serde(default)]
    pub projects: Vec<String>,

    #[serde(default)]
    pub broker: BrokerConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub scripts: Vec<ScriptConfig>,

    #[serde(default)]
    pub known_topics: Vec<KnownTopicConfig>,

    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

fn default_namespace() -> String {
    "iotzoo".to_string()
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            projects: Vec::new(),
            broker: BrokerConfig::default(),
            cache: CacheConfig::default(),
            storage: StorageConfig::default(),
            scripts: Vec::new(),
            known_topics: Vec::new(),
            rules: Vec::new(),
        }
    }
}

impl HubConfig {
    /// Load and validate `configuration.yaml` from a config directory
    ///
    /// A relative storage path is resolved against `config_dir`.
    pub fn load(config_dir: impl AsRef<Path>) -> ConfigResult<Self> {
        let config_dir = config_dir.as_ref();
        let yaml = load_yaml(config_dir, CONFIG_FILE)?;

        let mut config = Self::from_yaml(&yaml)?;
        if config.storage.path.is_relative() {
            config.storage.path = config_dir.join(&config.storage.path);
        }
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an already tag-processed YAML value
    pub fn from_yaml(yaml: &Value) -> ConfigResult<Self> {
        if yaml.is_null() {
            return Ok(Self::default());
        }
        if !yaml.is_mapping() {
            return Err(ConfigError::Schema {
                reason: "configuration must be a mapping".to_string(),
            });
        }

        serde_yaml::from_value(yaml.clone()).map_err(|e| ConfigError::Schema {
            reason: e.to_string(),
        })
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.namespace.is_empty() || self.namespace.contains('/') {
            return Err(ConfigError::InvalidNamespace {
                namespace: self.namespace.clone(),
            });
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::EmptyCache);
        }

        for (index, rule) in self.rules.iter().enumerate() {
            if rule.source_topic.trim().is_empty() || rule.target_topic.trim().is_empty() {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: "source and target topic are required".to_string(),
                });
            }
            if !self.projects.is_empty() && !self.projects.contains(&rule.project) {
                return Err(ConfigError::InvalidRule {
                    index,
                    reason: format!("unknown project '{}'", rule.project),
                });
            }
        }

        for (index, script) in self.scripts.iter().enumerate() {
            if script.name.trim().is_empty() {
                return Err(ConfigError::UnnamedScript { index });
            }
        }

        Ok(())
    }

    /// Rules converted to the runtime model, in the configured namespace
    ///
    /// Derived ids repeated within the file get a `#n` suffix in order of
    /// appearance.
    pub fn rules(&self) -> Vec<Rule> {
        let mut seen: HashMap<String, usize> = HashMap::new();
        self.rules
            .iter()
            .map(|config| {
                let mut rule = config.to_rule(&self.namespace);
                if config.id.is_none() {
                    let count = seen.entry(rule.id.clone()).or_insert(0);
                    *count += 1;
                    if *count > 1 {
                        rule.id = format!("{}#{}", rule.id, count);
                    }
                }
                rule
            })
            .collect()
    }

    pub fn known_topics(&self) -> Vec<KnownTopic> {
        self.known_topics
            .iter()
            .map(|t| t.to_known_topic(&self.namespace))
            .collect()
    }

    /// Subscription filter for each project, `namespace/project/#`
    pub fn subscriptions(&self) -> Vec<String> {
        self.projects
            .iter()
            .map(|project| format!("{}/{}/#", self.namespace, project))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = HubConfig::from_yaml(&Value::Null).unwrap();
        assert_eq!(config.namespace, "iotzoo");
        assert_eq!(config.broker.host, "localhost");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.broker.client_id, "iot-hub");
        assert_eq!(config.cache.capacity, 200);
        assert_eq!(config.storage.history_per_topic, 1000);
    }

    #[test]
    fn test_parse_rules() {
        let yaml: Value = serde_yaml::from_str(
            r#"
namespace: home
projects: [garden]
rules:
  - id: pump-on
    project: garden
    source_topic: soil/moisture
    target_topic: pump
    expression: "input < 30"
    target_payload: "on"
    priority: 0
    delay_ms: 1000
    trigger_condition: fire_on_source_payload_changed
"#,
        )
        .unwrap();

        let config = HubConfig::from_yaml(&yaml).unwrap();
        config.validate().unwrap();

        let rules = config.rules();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.id, "pump-on");
        assert_eq!(rule.namespace_name, "home");
        assert_eq!(rule.expression.as_deref(), Some("input < 30"));
        assert_eq!(rule.priority, 0);
        assert_eq!(rule.delay_ms, 1000);
        assert_eq!(
            rule.trigger_condition,
            TriggerCondition::FireOnSourcePayloadChanged
        );
        assert_eq!(rule.target_topic_full_qualified(), "home/garden/pump");
    }

    fn unnamed_rule(target_topic: &str) -> RuleConfig {
        RuleConfig {
            id: None,
            project: "p".to_string(),
            source_topic: "a".to_string(),
            target_topic: target_topic.to_string(),
            expression: None,
            target_payload: None,
            trigger_condition: TriggerCondition::Always,
            priority: DEFAULT_RULE_PRIORITY,
            enabled: true,
            delay_ms: 0,
        }
    }

    #[test]
    fn test_rule_without_id_gets_stable_id() {
        let first = unnamed_rule("b").to_rule("ns");
        let second = unnamed_rule("b").to_rule("ns");
        assert_eq!(first.id, "config:p/a/b/5");
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn test_repeated_derived_ids_are_numbered() {
        let config = HubConfig {
            rules: vec![unnamed_rule("b"), unnamed_rule("c"), unnamed_rule("b")],
            ..Default::default()
        };
        let ids: Vec<_> = config.rules().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["config:p/a/b/5", "config:p/a/c/5", "config:p/a/b/5#2"]);
    }

    #[test]
    fn test_validate_rejects_bad_namespace() {
        let config = HubConfig {
            namespace: "a/b".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidNamespace { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_project() {
        let yaml: Value = serde_yaml::from_str(
            r#"
projects: [garden]
rules:
  - project: kitchen
    source_topic: a
    target_topic: b
"#,
        )
        .unwrap();
        let config = HubConfig::from_yaml(&yaml).unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRule { index: 0, .. })
        ));
    }

    #[test]
    fn test_load_from_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("rules")).unwrap();
        std::fs::write(
            dir.path().join("rules/garden.yaml"),
            "- project: garden\n  source_topic: button\n  target_topic: lamp\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("secrets.yaml"), "mqtt_password: pw\n").unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"
projects: [garden]
broker:
  username: hub
  password: !secret mqtt_password
known_topics:
  - project: garden
    topic: button
    direction: inbound
    keep_history: true
rules: !include_dir_merge_list rules
"#,
        )
        .unwrap();

        let config = HubConfig::load(dir.path()).unwrap();
        assert_eq!(config.broker.password.as_deref(), Some("pw"));
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.storage.path, dir.path().join(".storage"));
        assert_eq!(config.subscriptions(), vec!["iotzoo/garden/#".to_string()]);

        let topics = config.known_topics();
        assert_eq!(topics[0].message_direction, MessageDirection::Inbound);
        assert!(topics[0].keep_history);
        assert_eq!(topics[0].full_qualified_topic(), "iotzoo/garden/button");
    }
}
