use crate::error::ConfigError;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

pub const DEFAULT_POLLING_INTERVAL: u64 = 30;
pub const MIN_POLLING_INTERVAL: u64 = 10;
pub const MAX_POLLING_INTERVAL: u64 = 300;

/// User-editable ruleset. Owned by the UI/binding layer; the core only reads
/// it. Serialized with camelCase keys to match the persisted `config` entry;
/// snake_case aliases keep hand-written TOML files ergonomic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    pub subreddits: Vec<String>,
    pub keywords: Vec<String>,
    #[serde(alias = "poison_keywords")]
    pub poison_keywords: Vec<String>,
    #[serde(alias = "polling_interval")]
    pub polling_interval: u64,
    #[serde(alias = "notifications_enabled")]
    pub notifications_enabled: bool,
    #[serde(alias = "quiet_hours")]
    pub quiet_hours: QuietHours,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subreddits: Vec::new(),
            keywords: Vec::new(),
            poison_keywords: Vec::new(),
            polling_interval: DEFAULT_POLLING_INTERVAL,
            notifications_enabled: true,
            quiet_hours: QuietHours::default(),
        }
    }
}

impl Config {
    /// Poll interval in seconds, clamped to the supported range before use.
    pub fn effective_interval(&self) -> u64 {
        self.polling_interval
            .clamp(MIN_POLLING_INTERVAL, MAX_POLLING_INTERVAL)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Local-time window during which notifications are suppressed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuietHours {
    pub enabled: bool,
    pub start: String,
    pub end: String,
}

impl Default for QuietHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start: "22:00".to_string(),
            end: "08:00".to_string(),
        }
    }
}

impl QuietHours {
    /// Whether `now` falls inside the window. Windows where start > end wrap
    /// over midnight. An unparsable window is treated as disabled.
    pub fn is_quiet_at(&self, now: NaiveTime) -> bool {
        if !self.enabled {
            return false;
        }
        let (Some(start), Some(end)) = (parse_hhmm(&self.start), parse_hhmm(&self.end)) else {
            warn!(
                start = %self.start,
                end = %self.end,
                "unparsable quiet-hours window, ignoring"
            );
            return false;
        };
        if start <= end {
            now >= start && now < end
        } else {
            now >= start || now < end
        }
    }

    pub fn is_quiet_now(&self) -> bool {
        self.is_quiet_at(chrono::Local::now().time())
    }
}

fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}
