//! Configuration for the IoT hub
//!
//! `configuration.yaml` is read from the config directory with support for
//! these custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!include_dir_merge_list dir` - Merge lists from all YAML files
//! - `!secret key` - Substitute from secrets.yaml
//! - `!env_var VAR` - Environment variable substitution
//!
//! # Example
//!
//! ```ignore
//! use hub_config::HubConfig;
//!
//! let config = HubConfig::load("/config")?;
//! for rule in config.rules() {
//!     println!("{} -> {}", rule.source_topic, rule.target_topic);
//! }
//! ```

mod error;
mod hub_config;
mod loader;
mod secrets;

pub use error::{ConfigError, ConfigResult};
pub use hub_config::{
    BrokerConfig, CacheConfig, HubConfig, KnownTopicConfig, RuleConfig, ScriptConfig,
    StorageConfig, CONFIG_FILE, DERIVED_RULE_ID_PREFIX,
};
pub use loader::{load_yaml, YamlLoader};
pub use secrets::Secrets;
