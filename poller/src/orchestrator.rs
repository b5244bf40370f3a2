//! The poll engine state machine.
//!
//! One logical cycle: load config and dedup state, fetch a batch, run the
//! freshness, dedup and keyword stages, persist the results, notify, and
//! register the next trigger. At most one cycle runs at a time; the
//! concurrency guard is process-local and never persisted, so a fresh
//! process starts unlocked.

use crate::dedup::{fresh_items, SeenSet};
use crate::notify::{NotificationKind, NotificationSink};
use crate::scheduler::DurableScheduler;
use async_trait::async_trait;
use reddit_client::RedditClient;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use store::{keys, StateStore, Tier};
use subwatch_core::{
    matcher, ApiError, Config, CoreError, Hit, RateLimitSnapshot, SystemStatus,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Re-check delay when no subreddits are configured. This is a distinct path
/// from error backoff.
const NO_TOPICS_RECHECK: Duration = Duration::from_secs(60);

/// Ceiling for exponential error backoff, in seconds.
const BACKOFF_CAP_SECS: u64 = 300;

/// Maximum number of cached hits persisted for the feed, most recent first.
pub const HITS_CACHE_CAP: usize = 100;

/// Outbound fetch capability (the rate-limited upstream client).
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch_batch(&self, subreddits: &[String]) -> Result<Vec<Hit>, CoreError>;

    /// Current quota counters, when the implementation tracks them.
    fn rate_limits(&self) -> Option<RateLimitSnapshot> {
        None
    }
}

#[async_trait]
impl Fetch for RedditClient {
    async fn fetch_batch(&self, subreddits: &[String]) -> Result<Vec<Hit>, CoreError> {
        RedditClient::fetch_batch(self, subreddits).await
    }

    fn rate_limits(&self) -> Option<RateLimitSnapshot> {
        Some(RedditClient::rate_limits(self))
    }
}

/// Config read seam; the binding layer owns where config lives.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    async fn get_config(&self) -> Config;
}

/// Reads config from the durable store, applying defaults when absent.
pub struct StoreConfigProvider {
    store: Arc<StateStore>,
}

impl StoreConfigProvider {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ConfigProvider for StoreConfigProvider {
    async fn get_config(&self) -> Config {
        self.store
            .get(Tier::Durable, keys::CONFIG)
            .await
            .unwrap_or_default()
    }
}

/// UI-originated requests, funneled through the orchestrator so the hits
/// cache keeps a single writer.
#[derive(Debug, Clone)]
pub enum PollerCommand {
    /// Remove one cached hit by id.
    DismissHit(String),
}

/// Observable engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Stopped,
    /// Scheduled and waiting for the next trigger.
    Idle,
    /// A poll cycle is in flight.
    Running,
}

pub struct Poller {
    store: Arc<StateStore>,
    fetcher: Arc<dyn Fetch>,
    scheduler: Arc<dyn DurableScheduler>,
    sink: Arc<dyn NotificationSink>,
    config: Arc<dyn ConfigProvider>,
    running: AtomicBool,
    cycle_active: AtomicBool,
    consecutive_errors: AtomicU32,
}

/// Clears the cycle guard on every exit path, including unwinding.
struct CycleGuard<'a>(&'a AtomicBool);

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Poller {
    pub fn new(
        store: Arc<StateStore>,
        fetcher: Arc<dyn Fetch>,
        scheduler: Arc<dyn DurableScheduler>,
        sink: Arc<dyn NotificationSink>,
        config: Arc<dyn ConfigProvider>,
    ) -> Self {
        Self {
            store,
            fetcher,
            scheduler,
            sink,
            config,
            running: AtomicBool::new(false),
            cycle_active: AtomicBool::new(false),
            consecutive_errors: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> PollerState {
        if !self.running.load(Ordering::SeqCst) {
            PollerState::Stopped
        } else if self.cycle_active.load(Ordering::SeqCst) {
            PollerState::Running
        } else {
            PollerState::Idle
        }
    }

    /// Starts the engine and runs the first cycle immediately.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("start requested but already running");
            return;
        }
        self.consecutive_errors.store(0, Ordering::SeqCst);
        info!("starting poll engine");
        self.run_cycle().await;
    }

    /// Stops the engine and cancels the pending trigger. A cycle already in
    /// flight completes but will not reschedule.
    pub async fn stop(&self) {
        info!("stopping poll engine");
        self.running.store(false, Ordering::SeqCst);
        self.consecutive_errors.store(0, Ordering::SeqCst);
        self.scheduler.cancel().await;
    }

    /// Trigger entry point; a no-op unless the engine is running.
    pub async fn on_trigger(&self) {
        if !self.running.load(Ordering::SeqCst) {
            debug!("trigger fired while stopped, skipping");
            return;
        }
        self.run_cycle().await;
    }

    /// Drives triggers and UI commands until both channels close.
    pub async fn run(
        self: Arc<Self>,
        mut triggers: mpsc::Receiver<()>,
        mut commands: mpsc::Receiver<PollerCommand>,
    ) {
        loop {
            tokio::select! {
                trigger = triggers.recv() => match trigger {
                    Some(()) => self.on_trigger().await,
                    None => break,
                },
                command = commands.recv() => match command {
                    Some(PollerCommand::DismissHit(id)) => self.dismiss_hit(&id).await,
                    None => break,
                },
            }
        }
        debug!("poller run loop ended");
    }

    /// Removes one cached hit. Handled on the same task as poll cycles, so
    /// the hits cache keeps a single writer.
    pub async fn dismiss_hit(&self, id: &str) {
        let mut cached: Vec<Hit> = self
            .store
            .get(Tier::Durable, keys::HITS_CACHE)
            .await
            .unwrap_or_default();
        let before = cached.len();
        cached.retain(|hit| hit.id != id);
        if cached.len() != before {
            self.store.set(Tier::Durable, keys::HITS_CACHE, &cached).await;
            info!(id, "dismissed cached hit");
        }
    }

    async fn run_cycle(&self) {
        if self.cycle_active.swap(true, Ordering::SeqCst) {
            debug!("cycle already in flight, skipping");
            return;
        }
        let _guard = CycleGuard(&self.cycle_active);
        self.cycle(Uuid::new_v4()).await;
    }

    async fn cycle(&self, cycle_id: Uuid) {
        let config = self.config.get_config().await;
        let interval = config.effective_interval();

        if config.subreddits.is_empty() {
            info!(%cycle_id, "no subreddits configured, sleeping");
            self.set_status(SystemStatus::Idle).await;
            self.scheduler.schedule(NO_TOPICS_RECHECK).await;
            return;
        }

        let mut seen = SeenSet::from_ids(
            self.store
                .get(Tier::Session, keys::SEEN_SET)
                .await
                .unwrap_or_default(),
        );
        let latest_hit_timestamp: i64 = self
            .store
            .get(Tier::Durable, keys::LATEST_HIT_TIMESTAMP)
            .await
            .unwrap_or(0);

        debug!(
            %cycle_id,
            seen = seen.len(),
            latest_hit_timestamp,
            "fetching from {} subreddits",
            config.subreddits.len()
        );

        let items = match self.fetcher.fetch_batch(&config.subreddits).await {
            Ok(items) => {
                self.consecutive_errors.store(0, Ordering::SeqCst);
                items
            }
            Err(CoreError::Api(ApiError::RateLimitExceeded { reset_after })) => {
                warn!(%cycle_id, reset_after, "rate limited, sleeping until quota resets");
                self.set_status(SystemStatus::RateLimited).await;
                self.scheduler
                    .schedule(Duration::from_secs(reset_after))
                    .await;
                return;
            }
            Err(e) => {
                let errors = self.consecutive_errors.fetch_add(1, Ordering::SeqCst) + 1;
                let delay = backoff_delay(interval, errors);
                error!(
                    %cycle_id,
                    errors,
                    "fetch failed: {e}; retrying in {}s",
                    delay.as_secs()
                );
                self.set_status(SystemStatus::Error).await;
                self.scheduler.schedule(delay).await;
                return;
            }
        };

        if let Some(snapshot) = self.fetcher.rate_limits() {
            self.store
                .set(Tier::Session, keys::RATE_LIMITS, &snapshot)
                .await;
        }

        let fresh = fresh_items(items, latest_hit_timestamp);
        let mut new_items: Vec<Hit> = Vec::new();
        for item in fresh {
            if seen.contains(&item.id) {
                continue;
            }
            seen.insert(item.id.clone());
            new_items.push(item);
        }

        self.store
            .set(Tier::Session, keys::SEEN_SET, &seen.to_ids())
            .await;

        let matched = matcher::filter_items(&new_items, &config);
        info!(
            %cycle_id,
            new = new_items.len(),
            matched = matched.len(),
            "cycle complete"
        );

        if !matched.is_empty() {
            self.cache_hits(&matched).await;
            self.raise_latest_hit_timestamp(latest_hit_timestamp, &matched)
                .await;
            self.sink.notify(NotificationKind::UiRefresh).await;
            if config.notifications_enabled {
                self.sink.notify(NotificationKind::Sound).await;
            }
        }

        self.set_status(SystemStatus::Watching).await;

        if self.running.load(Ordering::SeqCst) {
            self.scheduler.schedule(Duration::from_secs(interval)).await;
        } else {
            debug!(%cycle_id, "stopped mid-cycle, not rescheduling");
        }
    }

    /// Prepends new matches to the persisted feed, newest first, capped at
    /// [`HITS_CACHE_CAP`].
    async fn cache_hits(&self, matched: &[Hit]) {
        let cached: Vec<Hit> = self
            .store
            .get(Tier::Durable, keys::HITS_CACHE)
            .await
            .unwrap_or_default();
        let mut updated: Vec<Hit> = matched.to_vec();
        updated.extend(cached);
        updated.truncate(HITS_CACHE_CAP);
        self.store
            .set(Tier::Durable, keys::HITS_CACHE, &updated)
            .await;
    }

    /// The watermark never decreases.
    async fn raise_latest_hit_timestamp(&self, current: i64, matched: &[Hit]) {
        let Some(max_ts) = matched.iter().map(|hit| hit.created_utc).max() else {
            return;
        };
        if max_ts > current {
            self.store
                .set(Tier::Durable, keys::LATEST_HIT_TIMESTAMP, &max_ts)
                .await;
        }
    }

    async fn set_status(&self, status: SystemStatus) {
        self.store
            .set(Tier::Session, keys::SYSTEM_STATUS, &status)
            .await;
    }
}

/// `min(base * 2^n, cap)` seconds for `n` consecutive failures; the base
/// interval unchanged once the counter is back to zero.
pub fn backoff_delay(base_interval: u64, consecutive_errors: u32) -> Duration {
    if consecutive_errors == 0 {
        return Duration::from_secs(base_interval);
    }
    let factor = 2u64.saturating_pow(consecutive_errors.min(32));
    Duration::from_secs(base_interval.saturating_mul(factor).min(BACKOFF_CAP_SECS))
}
