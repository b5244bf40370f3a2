pub mod dedup;
pub mod notify;
pub mod orchestrator;
pub mod scheduler;

pub use dedup::{fresh_items, SeenSet, SEEN_SET_CAP};
pub use notify::{DesktopSink, NotificationKind, NotificationSink};
pub use orchestrator::{
    backoff_delay, ConfigProvider, Fetch, Poller, PollerCommand, PollerState,
    StoreConfigProvider, HITS_CACHE_CAP,
};
pub use scheduler::{AlarmScheduler, DurableScheduler};
