//! Known topics, topic history and registered microcontrollers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::topic::full_qualified_topic;

/// Direction of a topic as seen from the hub
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    #[default]
    Unknown,
    Inbound,
    Outbound,
    Internal,
}

/// A topic the hub knows about
///
/// Updated on every inbound message for the topic and used as the durable
/// fallback for "last known value" lookups when the recent-value cache has no
/// entry (e.g. after a restart).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownTopic {
    #[serde(default)]
    pub namespace_name: String,

    pub project_name: String,

    /// Logical topic (without namespace and project)
    pub topic: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub message_direction: MessageDirection,

    /// Append every received payload to the topic history
    #[serde(default)]
    pub keep_history: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_payload: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload_updated_at: Option<DateTime<Utc>>,

    /// Device that published the topic (MAC address for microcontrollers)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retained: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_edit: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_delete: Option<bool>,

    /// Topic this one was registered under (e.g. a microcontroller's registration topic)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_topic: Option<String>,
}

impl KnownTopic {
    pub fn new(project_name: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            namespace_name: String::new(),
            project_name: project_name.into(),
            topic: topic.into(),
            description: None,
            message_direction: MessageDirection::Unknown,
            keep_history: false,
            last_payload: None,
            payload_updated_at: None,
            sender: None,
            retained: None,
            allow_edit: None,
            allow_delete: None,
            parent_topic: None,
        }
    }

    pub fn with_namespace(mut self, namespace_name: impl Into<String>) -> Self {
        self.namespace_name = namespace_name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_direction(mut self, direction: MessageDirection) -> Self {
        self.message_direction = direction;
        self
    }

    pub fn with_history(mut self, keep_history: bool) -> Self {
        self.keep_history = keep_history;
        self
    }

    pub fn with_last_payload(mut self, payload: impl Into<String>) -> Self {
        self.last_payload = Some(payload.into());
        self.payload_updated_at = Some(Utc::now());
        self
    }

    pub fn full_qualified_topic(&self) -> String {
        full_qualified_topic(&self.namespace_name, &self.project_name, &self.topic)
    }
}

/// One persisted payload of a topic with history enabled
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicHistory {
    pub project_name: String,
    pub topic: String,
    #[serde(default)]
    pub payload: Option<String>,
    pub date_received: DateTime<Utc>,
}

impl TopicHistory {
    pub fn new(
        project_name: impl Into<String>,
        topic: impl Into<String>,
        payload: Option<String>,
    ) -> Self {
        Self {
            project_name: project_name.into(),
            topic: topic.into(),
            payload,
            date_received: Utc::now(),
        }
    }
}

/// A microcontroller that registered itself with the hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownMicrocontroller {
    pub mac_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_mqtt_broker: Option<String>,
    #[serde(default)]
    pub namespace_name: String,
    #[serde(default)]
    pub project_name: String,
    #[serde(default)]
    pub board_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_date_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_topics: Vec<KnownTopic>,
}

impl KnownMicrocontroller {
    pub fn new(mac_address: impl Into<String>) -> Self {
        Self {
            mac_address: mac_address.into(),
            ip_address: None,
            ip_mqtt_broker: None,
            namespace_name: String::new(),
            project_name: String::new(),
            board_type: String::new(),
            firmware_version: None,
            description: None,
            online: None,
            boot_date_time: None,
            known_topics: Vec::new(),
        }
    }
}
