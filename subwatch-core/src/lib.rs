pub mod config;
pub mod error;
pub mod matcher;
pub mod types;

pub use config::{
    Config, QuietHours, DEFAULT_POLLING_INTERVAL, MAX_POLLING_INTERVAL, MIN_POLLING_INTERVAL,
};
pub use error::{ApiError, ConfigError, CoreError, StorageError};
pub use types::{Hit, RateLimitSnapshot, SystemStatus};
