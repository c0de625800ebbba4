//! Built-in handlers for heartbeat, self-registration and lost devices
//!
//! These run on every routed message before the rules. They answer
//! heartbeats, store what devices announce about themselves and bring
//! microcontrollers that lost their namespace back into ours.

use std::sync::Arc;

use chrono::Utc;
use hub_core::topics::{
    ALIVE, ALIVE_ACK, DEFAULT_PROJECT, REGISTER_KNOWN_TOPIC, REGISTER_MICROCONTROLLER,
    SAVE_MICROCONTROLLER_CONFIG,
};
use hub_core::{KnownMicrocontroller, OutboundMessage, TopicEntry};
use hub_event_bus::Publisher;
use hub_registries::{KnownTopicStore, MicrocontrollerStore};
use serde::de::DeserializeOwned;
use tracing::{debug, info, instrument};

use crate::error::{RouterError, RouterResult};
use crate::registration::{AliveMessage, KnownTopicPayload, MicrocontrollerPayload};

/// Handlers for the reserved topics
pub struct DefaultTopicHandlers {
    namespace: String,
    broker_host: Option<String>,
    known_topics: Arc<dyn KnownTopicStore>,
    microcontrollers: Arc<dyn MicrocontrollerStore>,
    publisher: Arc<dyn Publisher>,
}

impl DefaultTopicHandlers {
    pub fn new(
        namespace: impl Into<String>,
        known_topics: Arc<dyn KnownTopicStore>,
        microcontrollers: Arc<dyn MicrocontrollerStore>,
        publisher: Arc<dyn Publisher>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            broker_host: None,
            known_topics,
            microcontrollers,
            publisher,
        }
    }

    /// Broker address handed to microcontrollers that get recreated
    pub fn with_broker_host(mut self, broker_host: impl Into<String>) -> Self {
        self.broker_host = Some(broker_host.into());
        self
    }

    /// Run the handler matching the entry's topic, if any
    ///
    /// Empty payloads are never handled.
    pub async fn handle(&self, entry: &TopicEntry) -> RouterResult<()> {
        if entry.payload.is_empty() {
            return Ok(());
        }

        if entry.topic.to_lowercase().ends_with(ALIVE) {
            self.acknowledge_alive(entry).await
        } else if is_reserved(&entry.topic, REGISTER_KNOWN_TOPIC) {
            self.register_known_topic(entry).await
        } else if is_reserved(&entry.topic, REGISTER_MICROCONTROLLER) {
            self.register_microcontroller(entry).await
        } else {
            Ok(())
        }
    }

    async fn acknowledge_alive(&self, entry: &TopicEntry) -> RouterResult<()> {
        let ack_topic = format!("{}_ack", entry.full_qualified_topic());
        self.publisher
            .publish(OutboundMessage::new(ack_topic, Utc::now().to_rfc3339()))
            .await?;

        // Plain heartbeats carry no device description
        let Ok(alive) = serde_json::from_str::<AliveMessage>(&entry.payload) else {
            return Ok(());
        };
        let mc = alive.microcontroller;
        let project = if mc.project_name.is_empty() {
            entry.project_name.as_str()
        } else {
            mc.project_name.as_str()
        };
        let topic = format!(
            "{}/{}/{}/{}/{}",
            entry.namespace_name, project, mc.board_type, mc.mac_address, ALIVE_ACK
        );
        debug!(mac = %mc.mac_address, "Acknowledging microcontroller heartbeat");
        self.publisher.publish(OutboundMessage::new(topic, "ok")).await?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(topic = %entry.topic))]
    async fn register_known_topic(&self, entry: &TopicEntry) -> RouterResult<()> {
        let payload: KnownTopicPayload = parse(entry, &entry.payload)?;
        let mut known = payload.into_known_topic();

        if known.namespace_name.is_empty() {
            known.namespace_name = entry.namespace_name.clone();
        }
        if known.project_name.is_empty() {
            known.project_name = entry.project_name.clone();
        }
        known.topic = strip_topic_prefix(&known.topic, &known.namespace_name, &known.project_name);

        info!(known_topic = %known.topic, project = %known.project_name, "Registering known topic");
        self.known_topics.save(&known).await?;
        Ok(())
    }

    #[instrument(skip(self, entry), fields(topic = %entry.topic))]
    async fn register_microcontroller(&self, entry: &TopicEntry) -> RouterResult<()> {
        let payload: MicrocontrollerPayload = parse(entry, &entry.payload)?;
        let (mut mc, topics) = payload.into_parts();

        if mc.namespace_name.is_empty() {
            mc.namespace_name = entry.namespace_name.clone();
        }
        if mc.project_name.is_empty() {
            mc.project_name = entry.project_name.clone();
        }
        mc.boot_date_time = Some(Utc::now());

        let mut registered = Vec::with_capacity(topics.len());
        for mut known in topics {
            known.namespace_name = mc.namespace_name.clone();
            known.project_name = mc.project_name.clone();
            known.topic = strip_topic_prefix(&known.topic, &mc.namespace_name, &mc.project_name);
            known.allow_edit = Some(false);
            known.allow_delete = Some(false);
            known.sender = Some(mc.mac_address.clone());

            let existing = self
                .known_topics
                .get_by_name(Some(&known.project_name), &known.topic)
                .await?;
            if existing.is_some() {
                debug!(known_topic = %known.topic, "Known topic already registered");
            } else {
                self.known_topics.save(&known).await?;
            }
            registered.push(known);
        }
        mc.known_topics = registered;

        info!(
            mac = %mc.mac_address,
            board = %mc.board_type,
            topics = mc.known_topics.len(),
            "Registering microcontroller"
        );
        self.microcontrollers.save(&mc).await?;
        Ok(())
    }

    /// Bring a microcontroller that reports on `i_am_lost` into our namespace
    ///
    /// Returns whether a configuration was pushed back to the device.
    #[instrument(skip(self, payload))]
    pub async fn handle_i_am_lost(&self, payload: &str) -> RouterResult<bool> {
        let incoming: MicrocontrollerPayload =
            serde_json::from_str(payload).map_err(|e| RouterError::InvalidPayload {
                topic: hub_core::topics::I_AM_LOST.to_string(),
                reason: e.to_string(),
            })?;
        if incoming.mac_address.is_empty() {
            return Err(RouterError::InvalidPayload {
                topic: hub_core::topics::I_AM_LOST.to_string(),
                reason: "MAC address is missing".to_string(),
            });
        }

        let incoming_project = if incoming.project_name.is_empty() {
            DEFAULT_PROJECT
        } else {
            incoming.project_name.as_str()
        };

        let mut stored = match self.microcontrollers.get_by_mac(&incoming.mac_address).await? {
            Some(mc) => mc,
            None => {
                let mut mc = KnownMicrocontroller::new(incoming.mac_address.clone());
                mc.namespace_name = self.namespace.clone();
                mc.project_name = incoming_project.to_string();
                mc.ip_address = incoming.ip_address.clone();
                mc.board_type = incoming.board_type.clone();
                mc.firmware_version = incoming.firmware_version.clone();
                mc.ip_mqtt_broker = self.broker_host.clone();
                info!(mac = %mc.mac_address, "Creating lost microcontroller");
                self.microcontrollers.save(&mc).await?;
                mc
            }
        };

        if stored.project_name == incoming_project && incoming.namespace_name == self.namespace {
            debug!(mac = %stored.mac_address, "Microcontroller configuration is current");
            return Ok(false);
        }

        stored.namespace_name = self.namespace.clone();
        self.microcontrollers.save(&stored).await?;

        let config = serde_json::to_string(&MicrocontrollerPayload::from(&stored)).map_err(|e| {
            RouterError::InvalidPayload {
                topic: SAVE_MICROCONTROLLER_CONFIG.to_string(),
                reason: e.to_string(),
            }
        })?;
        let topic = format!("{}/{}", stored.mac_address, SAVE_MICROCONTROLLER_CONFIG);
        info!(mac = %stored.mac_address, project = %stored.project_name, "Pushing configuration to lost microcontroller");
        self.publisher.publish(OutboundMessage::new(topic, config)).await?;
        Ok(true)
    }
}

fn parse<T: DeserializeOwned>(entry: &TopicEntry, payload: &str) -> RouterResult<T> {
    serde_json::from_str(payload).map_err(|e| RouterError::InvalidPayload {
        topic: entry.full_qualified_topic(),
        reason: e.to_string(),
    })
}

/// `name` itself or a topic whose last segment is `name`
fn is_reserved(topic: &str, name: &str) -> bool {
    topic == name
        || topic
            .strip_suffix(name)
            .is_some_and(|rest| rest.ends_with('/'))
}

/// Remove a leading `namespace/project/` from a topic
pub fn strip_topic_prefix(topic: &str, namespace: &str, project: &str) -> String {
    let prefix = format!("{}/{}/", namespace, project);
    topic.strip_prefix(&prefix).unwrap_or(topic).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_topic_prefix() {
        assert_eq!(strip_topic_prefix("iotzoo/garden/pump", "iotzoo", "garden"), "pump");
        assert_eq!(strip_topic_prefix("esp32/AA/led/0", "iotzoo", "garden"), "esp32/AA/led/0");
    }

    #[test]
    fn test_is_reserved() {
        assert!(is_reserved("register_known_topic", REGISTER_KNOWN_TOPIC));
        assert!(is_reserved("esp32/AA/register_known_topic", REGISTER_KNOWN_TOPIC));
        assert!(!is_reserved("esp32/AA/unregister_known_topic", REGISTER_KNOWN_TOPIC));
    }
}
