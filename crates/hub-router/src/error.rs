//! Router errors

use hub_event_bus::PublishError;
use hub_registries::StoreError;
use hub_rules::RuleError;
use thiserror::Error;

/// Errors raised while routing one message
///
/// None of these stop the router; they are logged and reported per rule.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("rule error: {0}")]
    Rule(#[from] RuleError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),

    #[error("invalid payload on {topic}: {reason}")]
    InvalidPayload { topic: String, reason: String },
}

/// Result type for routing operations
pub type RouterResult<T> = Result<T, RouterError>;
