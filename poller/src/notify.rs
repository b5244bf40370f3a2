//! Outbound notification fan-out.
//!
//! Notifications are fire-and-forget and carry no payload; consumers re-read
//! the persisted hits cache. Failures are logged, never retried, and never
//! block a poll cycle.

use async_trait::async_trait;
use std::sync::Arc;
use store::{keys, StateStore, Tier};
use subwatch_core::Config;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// Audible alert request.
    Sound,
    /// The hits cache changed; any attached view should reload it.
    UiRefresh,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, kind: NotificationKind);
}

/// Desktop notifications through the session notification daemon. Quiet
/// hours are consumed here: deliveries inside the configured window are
/// dropped silently.
pub struct DesktopSink {
    store: Arc<StateStore>,
}

impl DesktopSink {
    pub fn new(store: Arc<StateStore>) -> Self {
        Self { store }
    }

    async fn in_quiet_hours(&self) -> bool {
        let config: Config = self
            .store
            .get(Tier::Durable, keys::CONFIG)
            .await
            .unwrap_or_default();
        config.quiet_hours.is_quiet_now()
    }
}

#[async_trait]
impl NotificationSink for DesktopSink {
    async fn notify(&self, kind: NotificationKind) {
        if self.in_quiet_hours().await {
            debug!(?kind, "suppressed during quiet hours");
            return;
        }

        let with_sound = kind == NotificationKind::Sound;
        let delivery = tokio::task::spawn_blocking(move || {
            let mut notification = notify_rust::Notification::new();
            notification
                .appname("subwatch")
                .summary("New matching posts")
                .body("Open the subwatch feed to review the latest matches.");
            if with_sound {
                notification.sound_name("message-new-instant");
            }
            notification.show().map(|_| ())
        })
        .await;

        match delivery {
            Ok(Ok(())) => debug!(?kind, "notification delivered"),
            Ok(Err(e)) => warn!("notification delivery failed: {e}"),
            Err(e) => warn!("notification task failed: {e}"),
        }
    }
}
