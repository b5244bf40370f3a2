//! Restart-surviving trigger registration.
//!
//! The hosting process may be terminated between cycles, so the next fire
//! time is persisted as an absolute deadline rather than held in a live
//! timer. Firing is at-least-once; the orchestrator's dedup absorbs
//! duplicates.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use store::{keys, StateStore, Tier};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default floor applied to every requested delay.
const MIN_TRIGGER_DELAY: Duration = Duration::from_secs(1);

#[async_trait]
pub trait DurableScheduler: Send + Sync {
    /// Registers the next trigger after `delay`, replacing any pending one.
    async fn schedule(&self, delay: Duration);

    /// Cancels the pending trigger, if any.
    async fn cancel(&self);
}

/// Timer-backed scheduler persisting its deadline so a restarted process can
/// re-arm a pending trigger instead of losing it.
pub struct AlarmScheduler {
    store: Arc<StateStore>,
    triggers: mpsc::Sender<()>,
    armed: Mutex<Option<JoinHandle<()>>>,
    min_delay: Duration,
}

impl AlarmScheduler {
    pub fn new(store: Arc<StateStore>, triggers: mpsc::Sender<()>) -> Self {
        Self {
            store,
            triggers,
            armed: Mutex::new(None),
            min_delay: MIN_TRIGGER_DELAY,
        }
    }

    pub fn with_min_delay(mut self, min_delay: Duration) -> Self {
        self.min_delay = min_delay;
        self
    }

    /// Re-arms a deadline persisted by a previous process, firing promptly
    /// when it is already past due. Returns whether a pending trigger was
    /// found.
    pub async fn resume(&self) -> bool {
        let Some(deadline) = self
            .store
            .get::<i64>(Tier::Durable, keys::NEXT_POLL_AT)
            .await
        else {
            return false;
        };
        let remaining = (deadline - now_epoch()).max(0) as u64;
        debug!(remaining, "re-arming persisted trigger");
        self.arm(Duration::from_secs(remaining).max(self.min_delay))
            .await;
        true
    }

    async fn arm(&self, delay: Duration) {
        let store = Arc::clone(&self.store);
        let triggers = self.triggers.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            store.remove(Tier::Durable, keys::NEXT_POLL_AT).await;
            if triggers.send(()).await.is_err() {
                warn!("trigger receiver dropped, poll trigger lost");
            }
        });
        let mut armed = self.armed.lock().await;
        if let Some(previous) = armed.replace(handle) {
            previous.abort();
        }
    }
}

#[async_trait]
impl DurableScheduler for AlarmScheduler {
    async fn schedule(&self, delay: Duration) {
        let delay = delay.max(self.min_delay);
        let deadline = now_epoch() + delay.as_secs() as i64;
        self.store
            .set(Tier::Durable, keys::NEXT_POLL_AT, &deadline)
            .await;
        debug!(seconds = delay.as_secs(), "next trigger scheduled");
        self.arm(delay).await;
    }

    async fn cancel(&self) {
        {
            let mut armed = self.armed.lock().await;
            if let Some(handle) = armed.take() {
                handle.abort();
            }
        }
        self.store.remove(Tier::Durable, keys::NEXT_POLL_AT).await;
        debug!("pending trigger cancelled");
    }
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
