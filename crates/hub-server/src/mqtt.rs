//! MQTT transport
//!
//! Bridges rumqttc to the hub: incoming publishes are fired on the message
//! bus, router publishes go out through the [`MqttPublisher`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hub_config::{BrokerConfig, HubConfig};
use hub_core::topics::{I_AM_LOST, INIT};
use hub_core::{InboundMessage, OutboundMessage};
use hub_event_bus::{PublishError, PublishResult, Publisher, SharedMessageBus};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tracing::{debug, error, info, warn};

/// Capacity of the rumqttc request channel
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Pause before polling again after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

pub fn connect(broker: &BrokerConfig) -> (AsyncClient, EventLoop) {
    let mut options = MqttOptions::new(&broker.client_id, &broker.host, broker.port);
    options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));
    if let (Some(username), Some(password)) = (&broker.username, &broker.password) {
        options.set_credentials(username, password);
    }
    AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY)
}

fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}

fn qos_to_u8(qos: QoS) -> u8 {
    match qos {
        QoS::AtMostOnce => 0,
        QoS::AtLeastOnce => 1,
        QoS::ExactlyOnce => 2,
    }
}

/// [`Publisher`] over an MQTT client
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    pub fn new(client: AsyncClient) -> Self {
        Self {
            client,
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

#[async_trait]
impl Publisher for MqttPublisher {
    async fn publish(&self, message: OutboundMessage) -> PublishResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PublishError::NotConnected);
        }

        debug!(topic = %message.topic, payload = %message.payload, "Publishing to broker");
        self.client
            .publish(
                message.topic.clone(),
                qos_from_u8(message.qos),
                message.retain,
                message.payload.into_bytes(),
            )
            .await
            .map_err(|e| PublishError::Transport {
                topic: message.topic,
                reason: e.to_string(),
            })
    }
}

/// Subscribe to every project and announce the hub
async fn on_connected(client: AsyncClient, publisher: MqttPublisher, config: Arc<HubConfig>) {
    let mut filters = config.subscriptions();
    filters.push(I_AM_LOST.to_string());

    for filter in filters {
        if let Err(e) = client.subscribe(filter.as_str(), QoS::AtLeastOnce).await {
            error!(filter = %filter, error = %e, "Subscribe failed");
        } else {
            info!(filter = %filter, "Subscribed");
        }
    }

    for project in &config.projects {
        let topic = format!("{}/{}/{}", config.namespace, project, INIT);
        let announcement = OutboundMessage::new(topic, "").with_qos(2);
        if let Err(e) = publisher.publish(announcement).await {
            warn!(project = %project, error = %e, "Failed to announce project");
        }
    }
}

/// Drive the MQTT event loop until the task is aborted
///
/// rumqttc reconnects on the next poll after an error; every ConnAck
/// re-subscribes.
pub async fn run_event_loop(
    mut event_loop: EventLoop,
    client: AsyncClient,
    publisher: MqttPublisher,
    bus: SharedMessageBus,
    config: Arc<HubConfig>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "Connected to broker");
                publisher.set_connected(true);
                // Requests go through the channel this loop drains
                tokio::spawn(on_connected(
                    client.clone(),
                    publisher.clone(),
                    config.clone(),
                ));
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let payload = String::from_utf8_lossy(&publish.payload).into_owned();
                let message = InboundMessage::new(publish.topic.clone(), payload)
                    .with_qos(qos_to_u8(publish.qos))
                    .with_retain(publish.retain);
                bus.fire(message);
            }
            Ok(_) => {}
            Err(e) => {
                publisher.set_connected(false);
                warn!(error = %e, "Broker connection error");
                tokio::time::sleep(RECONNECT_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_mapping() {
        for qos in 0..=2 {
            assert_eq!(qos_to_u8(qos_from_u8(qos)), qos);
        }
        assert_eq!(qos_from_u8(7), QoS::AtMostOnce);
    }

    #[tokio::test]
    async fn test_publish_before_connect_fails() {
        let (client, _event_loop) = connect(&BrokerConfig::default());
        let publisher = MqttPublisher::new(client);

        let result = publisher.publish(OutboundMessage::new("iotzoo/p/t", "1")).await;
        assert!(matches!(result, Err(PublishError::NotConnected)));
    }
}
