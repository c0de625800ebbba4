//! Message routing for the IoT hub
//!
//! This crate turns inbound transport messages into rule evaluations:
//! - MessageRouter: known-topic bookkeeping, default topics, rules, cache
//! - DefaultTopicHandlers: heartbeats, self-registration, lost devices
//! - DelayedPublishScheduler: delayed publishes with toggle semantics
//! - RouterService: drains the message bus into the router

mod default_topics;
mod error;
pub mod registration;
mod router;
mod scheduler;
mod service;

pub use default_topics::{strip_topic_prefix, DefaultTopicHandlers};
pub use error::{RouterError, RouterResult};
pub use registration::{AliveMessage, KnownTopicPayload, MicrocontrollerPayload};
pub use router::{
    MessageOutcome, MessageRouter, RouterStores, RuleOutcome, RuleStatus, NO_DATA_CHANGE,
    NO_TARGET_PAYLOAD,
};
pub use scheduler::{DelayedPublishScheduler, ScheduleOutcome};
pub use service::RouterService;
