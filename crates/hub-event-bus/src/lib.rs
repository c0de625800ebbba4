//! Message bus for the IoT hub
//!
//! This crate provides the MessageBus, which carries inbound transport
//! messages to the router and outbound publishes back to whoever drains
//! them, plus the [`Publisher`] trait the router publishes through.

use async_trait::async_trait;
use dashmap::DashMap;
use hub_core::{InboundMessage, OutboundMessage};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Default channel capacity for message subscriptions
const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Errors raised while handing a message to the transport
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("transport rejected publish to {topic}: {reason}")]
    Transport { topic: String, reason: String },

    #[error("transport is not connected")]
    NotConnected,
}

/// Result type for publish operations
pub type PublishResult<T> = Result<T, PublishError>;

/// Something that can publish outbound messages
///
/// Immediate and delayed publishes both go through the same publisher so
/// they share one ordered path to the transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: OutboundMessage) -> PublishResult<()>;
}

/// The message bus
///
/// Supports:
/// - Subscribing to one full transport topic
/// - Subscribing to all inbound messages
/// - Subscribing to everything published outbound
pub struct MessageBus {
    /// Map of full topics to their broadcast senders
    listeners: DashMap<String, broadcast::Sender<InboundMessage>>,
    /// Sender for subscribers of every inbound message
    match_all_sender: broadcast::Sender<InboundMessage>,
    /// Sender for outbound publishes
    outbound_sender: broadcast::Sender<OutboundMessage>,
    /// Channel capacity
    capacity: usize,
}

impl MessageBus {
    /// Create a new message bus
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new message bus with specified channel capacity
    pub fn with_capacity(capacity: usize) -> Self {
        let (match_all_sender, _) = broadcast::channel(capacity);
        let (outbound_sender, _) = broadcast::channel(capacity);
        Self {
            listeners: DashMap::new(),
            match_all_sender,
            outbound_sender,
            capacity,
        }
    }

    /// Subscribe to inbound messages on one full transport topic
    pub fn subscribe(&self, topic: impl Into<String>) -> broadcast::Receiver<InboundMessage> {
        let topic = topic.into();
        trace!(topic = %topic, "Subscribing to topic");

        self.listeners
            .entry(topic)
            .or_insert_with(|| {
                let (tx, _) = broadcast::channel(self.capacity);
                tx
            })
            .subscribe()
    }

    /// Subscribe to all inbound messages
    pub fn subscribe_all(&self) -> broadcast::Receiver<InboundMessage> {
        self.match_all_sender.subscribe()
    }

    /// Subscribe to every outbound publish
    pub fn subscribe_outbound(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound_sender.subscribe()
    }

    /// Deliver an inbound message to topic subscribers and match-all subscribers
    pub fn fire(&self, message: InboundMessage) {
        debug!(topic = %message.topic, "Firing inbound message");

        if let Some(sender) = self.listeners.get(&message.topic) {
            // No active receivers is fine
            let _ = sender.send(message.clone());
        }

        let _ = self.match_all_sender.send(message);
    }

    /// Get the number of topics with dedicated subscriptions
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for MessageBus {
    async fn publish(&self, message: OutboundMessage) -> PublishResult<()> {
        debug!(topic = %message.topic, payload = %message.payload, "Publishing outbound message");
        let _ = self.outbound_sender.send(message);
        Ok(())
    }
}

/// Thread-safe wrapper for MessageBus
pub type SharedMessageBus = Arc<MessageBus>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribe_and_fire() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe("home/garden/pump");

        bus.fire(InboundMessage::new("home/garden/pump", "on"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.topic, "home/garden/pump");
        assert_eq!(received.payload, "on");
    }

    #[tokio::test]
    async fn test_match_all_subscription() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe_all();

        bus.fire(InboundMessage::new("home/p/a", "1"));
        bus.fire(InboundMessage::new("home/p/b", "2"));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();

        assert_eq!(first.topic, "home/p/a");
        assert_eq!(second.topic, "home/p/b");
    }

    #[tokio::test]
    async fn test_no_cross_topic_pollution() {
        let bus = MessageBus::new();
        let mut rx_a = bus.subscribe("home/p/a");
        let mut rx_b = bus.subscribe("home/p/b");

        bus.fire(InboundMessage::new("home/p/a", "x"));

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.payload, "x");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_reaches_outbound_subscribers() {
        let bus = MessageBus::new();
        let mut rx = bus.subscribe_outbound();

        tokio_test::assert_ok!(bus.publish(OutboundMessage::new("home/p/lamp", "on")).await);

        let published = rx.recv().await.unwrap();
        assert_eq!(published.topic, "home/p/lamp");
        assert_eq!(published.payload, "on");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let bus = MessageBus::new();
        assert!(bus.publish(OutboundMessage::new("t", "p")).await.is_ok());
    }
}
