use serde::{Deserialize, Serialize};

/// A single content unit fetched from an upstream listing.
///
/// Never mutated after parsing; identity is the `id` field. Serialized field
/// names follow the upstream listing JSON so persisted hits round-trip
/// unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    pub id: String,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub permalink: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub selftext: Option<String>,
    pub created_utc: i64,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub link_flair_text: Option<String>,
    #[serde(default = "default_is_self")]
    pub is_self: bool,
    #[serde(default)]
    pub over_18: bool,
}

fn default_is_self() -> bool {
    true
}

/// Upstream quota counters mirrored from `x-ratelimit-*` response headers.
///
/// Values are trusted optimistically; the public endpoints do not always
/// return them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub remaining: f64,
    pub reset: f64,
    pub used: f64,
}

impl Default for RateLimitSnapshot {
    fn default() -> Self {
        Self {
            remaining: 100.0,
            reset: 0.0,
            used: 0.0,
        }
    }
}

/// Coarse pipeline state persisted for the status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemStatus {
    Idle,
    Watching,
    Error,
    RateLimited,
}
