//! Router service
//!
//! This module provides the `RouterService`, which drains inbound messages
//! from the message bus and routes them one at a time in arrival order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hub_event_bus::SharedMessageBus;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::router::{MessageOutcome, MessageRouter};

/// Runs a [`MessageRouter`] against the message bus
pub struct RouterService {
    /// Bus delivering inbound messages
    bus: SharedMessageBus,
    router: Arc<MessageRouter>,
    /// Running flag
    running: Arc<AtomicBool>,
    /// Shutdown signal sender
    shutdown_tx: broadcast::Sender<()>,
}

impl RouterService {
    pub fn new(bus: SharedMessageBus, router: Arc<MessageRouter>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            bus,
            router,
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
        }
    }

    pub fn router(&self) -> Arc<MessageRouter> {
        self.router.clone()
    }

    /// Start routing
    ///
    /// Subscribes before returning, so every message fired afterwards is
    /// routed.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Router service already running");
            return;
        }

        info!(namespace = %self.router.namespace(), "Starting router service");

        let mut message_rx = self.bus.subscribe_all();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let router = self.router.clone();
        let running = self.running.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    message_result = message_rx.recv() => {
                        match message_result {
                            Ok(message) => {
                                let outcome = router.handle(&message).await;
                                if let MessageOutcome::Ignored { reason } = &outcome {
                                    debug!(topic = %message.topic, reason = %reason, "Message ignored");
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(n)) => {
                                warn!("Router service lagged by {} messages", n);
                            }
                            Err(broadcast::error::RecvError::Closed) => {
                                info!("Message bus closed, stopping router service");
                                break;
                            }
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        info!("Received shutdown signal");
                        break;
                    }
                }
            }

            router.scheduler().cancel_all().await;
            running.store(false, Ordering::SeqCst);
            info!("Router service stopped");
        });
    }

    /// Stop routing; pending delayed publishes are dropped
    pub fn stop(&self) {
        if !self.running.load(Ordering::SeqCst) {
            return;
        }

        info!("Stopping router service");
        let _ = self.shutdown_tx.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
