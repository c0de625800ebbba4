//! Delayed publishing with toggle semantics
//!
//! A delayed publish is keyed by its (topic, payload). Scheduling the same
//! pair again while the first one is still pending cancels both: the second
//! trigger switches the pending publish off instead of queueing another one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hub_core::OutboundMessage;
use hub_event_bus::{PublishResult, Publisher};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, error, instrument};

/// What scheduling a message did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Published right away (no delay)
    Published,
    /// A timer was armed
    Armed,
    /// An identical pending publish was cancelled
    Cancelled,
}

type PendingKey = (String, String);

struct Pending {
    id: u64,
    handle: AbortHandle,
}

/// Timers for delayed publishes
///
/// Expired timers publish through the same [`Publisher`] as immediate
/// publishes.
pub struct DelayedPublishScheduler {
    publisher: Arc<dyn Publisher>,
    pending: Arc<Mutex<HashMap<PendingKey, Pending>>>,
    next_id: AtomicU64,
}

impl DelayedPublishScheduler {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Self {
            publisher,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Publish `message` now or after `delay`
    ///
    /// With a non-zero delay an identical pending (topic, payload) is
    /// cancelled instead of arming a second timer.
    #[instrument(skip(self, message), fields(topic = %message.topic))]
    pub async fn schedule(
        &self,
        message: OutboundMessage,
        delay: Duration,
    ) -> PublishResult<ScheduleOutcome> {
        if delay.is_zero() {
            self.publisher.publish(message).await?;
            return Ok(ScheduleOutcome::Published);
        }

        let key = (message.topic.clone(), message.payload.clone());
        let mut pending = self.pending.lock().await;

        if let Some(existing) = pending.remove(&key) {
            existing.handle.abort();
            debug!(payload = %message.payload, "Cancelled pending publish");
            return Ok(ScheduleOutcome::Cancelled);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let publisher = Arc::clone(&self.publisher);
        let timers = Arc::clone(&self.pending);
        let timer_key = key.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut timers = timers.lock().await;
                match timers.get(&timer_key) {
                    Some(p) if p.id == id => {
                        timers.remove(&timer_key);
                    }
                    _ => return,
                }
            }

            debug!(topic = %message.topic, "Delay expired, publishing");
            if let Err(e) = publisher.publish(message).await {
                error!(error = %e, "Delayed publish failed");
            }
        });

        pending.insert(
            key,
            Pending {
                id,
                handle: task.abort_handle(),
            },
        );
        debug!(delay_ms = delay.as_millis() as u64, "Armed delayed publish");
        Ok(ScheduleOutcome::Armed)
    }

    /// Number of armed timers
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Cancel every armed timer
    pub async fn cancel_all(&self) {
        let mut pending = self.pending.lock().await;
        for (_, p) in pending.drain() {
            p.handle.abort();
        }
    }
}
