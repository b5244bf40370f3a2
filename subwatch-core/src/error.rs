use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    Api(#[from] ApiError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Rate limit exhausted. Reset in {reset_after} seconds")]
    RateLimitExceeded { reset_after: u64 },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Unexpected status: {status_code}")]
    UnexpectedStatus { status_code: u16 },

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Read failed: {reason}")]
    ReadFailed { reason: String },

    #[error("Write failed: {reason}")]
    WriteFailed { reason: String },

    #[error("Corrupt state file: {path}")]
    CorruptFile { path: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl CoreError {
    /// Seconds until the upstream quota window resets, for rate-limit errors.
    pub fn rate_limit_reset(&self) -> Option<u64> {
        match self {
            CoreError::Api(ApiError::RateLimitExceeded { reset_after }) => Some(*reset_after),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_reset_is_exposed() {
        let err = CoreError::Api(ApiError::RateLimitExceeded { reset_after: 45 });
        assert_eq!(err.rate_limit_reset(), Some(45));

        let err = CoreError::Api(ApiError::ServerError { status_code: 500 });
        assert_eq!(err.rate_limit_reset(), None);
    }

    #[test]
    fn api_errors_convert_into_core_errors() {
        let err: CoreError = ApiError::RequestTimeout.into();
        assert!(matches!(err, CoreError::Api(ApiError::RequestTimeout)));
    }

    #[test]
    fn error_messages_carry_context() {
        let err = ApiError::RateLimitExceeded { reset_after: 60 };
        assert_eq!(err.to_string(), "Rate limit exhausted. Reset in 60 seconds");

        let err = StorageError::CorruptFile {
            path: "/tmp/state.json".to_string(),
        };
        assert!(err.to_string().contains("/tmp/state.json"));
    }
}
