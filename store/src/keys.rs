//! Persisted state layout.

pub const CONFIG: &str = "config";
pub const SEEN_SET: &str = "seenSet";
pub const LATEST_HIT_TIMESTAMP: &str = "latestHitTimestamp";
pub const HITS_CACHE: &str = "hitsCache";
pub const RATE_LIMITS: &str = "rateLimits";
pub const SYSTEM_STATUS: &str = "systemStatus";
pub const NEXT_POLL_AT: &str = "nextPollAt";
