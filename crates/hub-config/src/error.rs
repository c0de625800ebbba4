//! Configuration errors

use std::path::PathBuf;
use thiserror::Error;

/// Failures while reading `configuration.yaml` and the files it pulls in,
/// or while checking the result
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{tag}: {reason}")]
    InvalidTag { tag: &'static str, reason: String },

    #[error("{path} includes itself")]
    CircularInclude { path: PathBuf },

    #[error("no directory at {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("secret '{key}' is not defined in secrets.yaml")]
    SecretNotFound { key: String },

    #[error("environment variable '{var}' is not set")]
    EnvVarNotFound { var: String },

    #[error("configuration does not match the hub schema: {reason}")]
    Schema { reason: String },

    #[error("namespace '{namespace}' must be non-empty and must not contain '/'")]
    InvalidNamespace { namespace: String },

    #[error("cache capacity must be greater than zero")]
    EmptyCache,

    #[error("rule #{index}: {reason}")]
    InvalidRule { index: usize, reason: String },

    #[error("script #{index} has no name")]
    UnnamedScript { index: usize },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
