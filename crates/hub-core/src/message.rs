//! Messages flowing through the hub

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::known_topic::MessageDirection;
use crate::topic::{full_qualified_topic, TopicPath};
use crate::NULL_PAYLOAD;

/// A raw message as delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Full transport topic (`namespace/project/topic...`)
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: 0,
            retain: false,
        }
    }

    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// A message handed to the transport for publishing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

impl OutboundMessage {
    /// Create a non-retained, QoS 0 message
    ///
    /// An empty payload is replaced by [`NULL_PAYLOAD`] since brokers treat
    /// empty non-retained payloads as no-ops.
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        Self {
            topic: topic.into(),
            payload: if payload.is_empty() {
                NULL_PAYLOAD.to_string()
            } else {
                payload
            },
            qos: 0,
            retain: false,
        }
    }

    /// Create a retained message; the payload is kept as-is
    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: 0,
            retain: true,
        }
    }

    pub fn with_qos(mut self, qos: u8) -> Self {
        self.qos = qos;
        self
    }
}

/// One received message, split into its namespace/project/topic parts
///
/// Created per inbound message and kept in the recent-value cache until
/// evicted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub namespace_name: String,
    pub project_name: String,
    /// Logical topic (without namespace and project)
    pub topic: String,
    pub payload: String,
    /// Payload seen on the previous receipt of the same topic
    #[serde(default)]
    pub previous_payload: Option<String>,
    pub date_of_receipt: DateTime<Utc>,
    /// Milliseconds since the previous receipt of the same topic
    #[serde(default)]
    pub time_diff_ms: Option<i64>,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
    /// Whether a known topic exists for this message
    #[serde(default)]
    pub is_known: bool,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub message_direction: MessageDirection,
}

impl TopicEntry {
    /// Create an entry received now
    pub fn new(
        namespace_name: impl Into<String>,
        project_name: impl Into<String>,
        topic: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            namespace_name: namespace_name.into(),
            project_name: project_name.into(),
            topic: topic.into(),
            payload: payload.into(),
            previous_payload: None,
            date_of_receipt: Utc::now(),
            time_diff_ms: None,
            qos: 0,
            retain: false,
            is_known: false,
            sender: None,
            description: None,
            message_direction: MessageDirection::Unknown,
        }
    }

    /// Build an entry from a parsed topic path and the raw message
    pub fn from_message(path: TopicPath, message: &InboundMessage) -> Self {
        let mut entry = Self::new(path.namespace, path.project, path.topic, &message.payload);
        entry.qos = message.qos;
        entry.retain = message.retain;
        entry
    }

    /// `namespace/project/topic`
    pub fn full_qualified_topic(&self) -> String {
        full_qualified_topic(&self.namespace_name, &self.project_name, &self.topic)
    }
}
