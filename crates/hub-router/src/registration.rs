//! Payloads microcontrollers publish to register themselves
//!
//! Devices speak PascalCase JSON (`{"MacAddress": "...", "KnownTopics": [...]}`)
//! with the message direction as a number (-1 unknown, 0 inbound, 1 outbound,
//! 2 internal). These types translate between that wire format and the hub's
//! own model.

use hub_core::{KnownMicrocontroller, KnownTopic, MessageDirection};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A known topic as announced by a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct KnownTopicPayload {
    pub namespace_name: String,
    pub project_name: String,
    pub topic: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub keep_history: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retained: Option<bool>,
    pub message_direction: Value,
}

impl KnownTopicPayload {
    pub fn into_known_topic(self) -> KnownTopic {
        let mut known = KnownTopic::new(self.project_name, self.topic)
            .with_namespace(self.namespace_name)
            .with_direction(direction_from_wire(&self.message_direction))
            .with_history(self.keep_history);
        known.description = self.description;
        known.retained = self.retained;
        known
    }
}

/// A microcontroller as announced by the device itself
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct MicrocontrollerPayload {
    pub mac_address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_mqtt_broker: Option<String>,
    pub namespace_name: String,
    pub project_name: String,
    pub board_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub known_topics: Option<Vec<KnownTopicPayload>>,
}

impl MicrocontrollerPayload {
    /// Split into the microcontroller record and the topics it announced
    pub fn into_parts(self) -> (KnownMicrocontroller, Vec<KnownTopic>) {
        let topics = self
            .known_topics
            .unwrap_or_default()
            .into_iter()
            .map(KnownTopicPayload::into_known_topic)
            .collect();

        let mut microcontroller = KnownMicrocontroller::new(self.mac_address);
        microcontroller.ip_address = self.ip_address;
        microcontroller.ip_mqtt_broker = self.ip_mqtt_broker;
        microcontroller.namespace_name = self.namespace_name;
        microcontroller.project_name = self.project_name;
        microcontroller.board_type = self.board_type;
        microcontroller.firmware_version = self.firmware_version;
        microcontroller.description = self.description;

        (microcontroller, topics)
    }
}

impl From<&KnownMicrocontroller> for MicrocontrollerPayload {
    fn from(mc: &KnownMicrocontroller) -> Self {
        Self {
            mac_address: mc.mac_address.clone(),
            ip_address: mc.ip_address.clone(),
            ip_mqtt_broker: mc.ip_mqtt_broker.clone(),
            namespace_name: mc.namespace_name.clone(),
            project_name: mc.project_name.clone(),
            board_type: mc.board_type.clone(),
            firmware_version: mc.firmware_version.clone(),
            description: mc.description.clone(),
            known_topics: None,
        }
    }
}

/// Heartbeat payload carrying the sending microcontroller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AliveMessage {
    pub microcontroller: MicrocontrollerPayload,
}

/// Numeric or named message direction
pub fn direction_from_wire(value: &Value) -> MessageDirection {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(0) => MessageDirection::Inbound,
            Some(1) => MessageDirection::Outbound,
            Some(2) => MessageDirection::Internal,
            _ => MessageDirection::Unknown,
        },
        Value::String(s) => match s.to_lowercase().as_str() {
            "inbound" => MessageDirection::Inbound,
            "outbound" => MessageDirection::Outbound,
            "internal" => MessageDirection::Internal,
            _ => MessageDirection::Unknown,
        },
        _ => MessageDirection::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_microcontroller_from_wire() {
        let payload: MicrocontrollerPayload = serde_json::from_value(json!({
            "MacAddress": "E4:65:B8:79:27:E0",
            "IpAddress": "192.168.178.50",
            "NamespaceName": "iotzoo",
            "ProjectName": "garden",
            "BoardType": "esp32",
            "FirmwareVersion": "1.2.0",
            "KnownTopics": [
                {"Topic": "esp32/E4:65:B8:79:27:E0/button/0", "MessageDirection": 0, "KeepHistory": true},
                {"Topic": "esp32/E4:65:B8:79:27:E0/led/0", "MessageDirection": 1}
            ]
        }))
        .unwrap();

        let (mc, topics) = payload.into_parts();
        assert_eq!(mc.mac_address, "E4:65:B8:79:27:E0");
        assert_eq!(mc.board_type, "esp32");
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].message_direction, MessageDirection::Inbound);
        assert!(topics[0].keep_history);
        assert_eq!(topics[1].message_direction, MessageDirection::Outbound);
    }

    #[test]
    fn test_direction_from_wire() {
        assert_eq!(direction_from_wire(&json!(-1)), MessageDirection::Unknown);
        assert_eq!(direction_from_wire(&json!(2)), MessageDirection::Internal);
        assert_eq!(direction_from_wire(&json!("Outbound")), MessageDirection::Outbound);
        assert_eq!(direction_from_wire(&Value::Null), MessageDirection::Unknown);
    }

    #[test]
    fn test_config_round_trip_keys_are_pascal_case() {
        let mut mc = KnownMicrocontroller::new("AA:BB");
        mc.namespace_name = "iotzoo".to_string();
        mc.project_name = "default_project".to_string();

        let json = serde_json::to_value(MicrocontrollerPayload::from(&mc)).unwrap();
        assert_eq!(json["MacAddress"], "AA:BB");
        assert_eq!(json["ProjectName"], "default_project");
        assert!(json.get("KnownTopics").is_none());
    }
}
