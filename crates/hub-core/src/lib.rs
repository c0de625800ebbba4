//! Core types for the IoT hub
//!
//! This crate provides the fundamental types used throughout the hub:
//! topic paths, inbound/outbound messages, known topics, rules, and the
//! scalar values produced by expression evaluation.

mod known_topic;
mod message;
mod rule;
mod scalar;
mod topic;

pub use known_topic::{KnownMicrocontroller, KnownTopic, MessageDirection, TopicHistory};
pub use message::{InboundMessage, OutboundMessage, TopicEntry};
pub use rule::{ExpressionEvaluationResult, Rule, TriggerCondition};
pub use scalar::Scalar;
pub use topic::{full_qualified_topic, TopicPath, TopicPathError};

/// Payload published instead of an empty string on non-retained messages
pub const NULL_PAYLOAD: &str = "NULL";

/// Default priority for rules without an explicit priority
pub const DEFAULT_RULE_PRIORITY: i32 = 5;

/// Reserved topic names handled by the hub itself
pub mod topics {
    /// Suffix of heartbeat topics published by microcontrollers
    pub const ALIVE: &str = "alive";

    /// Acknowledgement topic for heartbeats
    pub const ALIVE_ACK: &str = "alive_ack";

    /// Control topic used by microcontrollers that lost their namespace
    pub const I_AM_LOST: &str = "i_am_lost";

    /// A device announces one of its topics
    pub const REGISTER_KNOWN_TOPIC: &str = "register_known_topic";

    /// A microcontroller announces itself and its topics
    pub const REGISTER_MICROCONTROLLER: &str = "register_microcontroller";

    /// Pushes namespace/project settings back to a microcontroller
    pub const SAVE_MICROCONTROLLER_CONFIG: &str = "save_microcontroller_config";

    /// Published once per project after connecting to the broker
    pub const INIT: &str = "init";

    /// Project used for microcontrollers that never told us theirs
    pub const DEFAULT_PROJECT: &str = "default_project";

    /// Whether `topic` is a lost-device control topic
    ///
    /// Control topics have fewer than three path segments and start with
    /// [`I_AM_LOST`], e.g. `i_am_lost` or `i_am_lost/AA:BB`.
    pub fn is_i_am_lost(topic: &str) -> bool {
        topic.split('/').count() < 3 && topic.starts_with(I_AM_LOST)
    }
}

#[cfg(test)]
mod tests {
    use super::topics::is_i_am_lost;

    #[test]
    fn test_i_am_lost_matches_short_prefixed_topics() {
        assert!(is_i_am_lost("i_am_lost"));
        assert!(is_i_am_lost("i_am_lost/AA:BB:CC"));
        assert!(is_i_am_lost("i_am_lost_esp32"));
        assert!(!is_i_am_lost("iotzoo/garden/i_am_lost"));
        assert!(!is_i_am_lost("lost"));
    }
}
