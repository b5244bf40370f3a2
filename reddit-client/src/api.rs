use crate::parser;
use reqwest::header::HeaderMap;
use reqwest::Client;
use serde_json::Value;
use std::sync::Mutex;
use std::time::Duration;
use subwatch_core::{ApiError, CoreError, Hit, RateLimitSnapshot};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://www.reddit.com";

/// Fail fast before quota is fully exhausted.
pub const RATE_LIMIT_THRESHOLD: f64 = 5.0;

/// Upstream caps listing results at 100 per request.
const MAX_RESULT_LIMIT: u32 = 100;

const USER_AGENT: &str = "daemon:subwatch:v0.1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RETRIES: u32 = 2;
const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_JITTER_FACTOR: f64 = 0.2;
const RETRYABLE_STATUS: [u16; 7] = [408, 413, 429, 500, 502, 503, 504];

/// Client for the public listing endpoints.
///
/// Tracks remaining quota passively from response headers and refuses to make
/// a request once the tracked quota drops below [`RATE_LIMIT_THRESHOLD`]. A
/// descriptive user agent is mandatory; the upstream blocks default agents.
#[derive(Debug)]
pub struct RedditClient {
    http: Client,
    base_url: String,
    limits: Mutex<RateLimitSnapshot>,
}

impl RedditClient {
    pub fn new() -> Result<Self, CoreError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            limits: Mutex::new(RateLimitSnapshot::default()),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Seeds quota counters from a previously persisted snapshot.
    pub fn with_initial_limits(self, snapshot: RateLimitSnapshot) -> Self {
        *self.limits.lock().unwrap() = snapshot;
        self
    }

    /// Current quota counters, for persistence and status display.
    pub fn rate_limits(&self) -> RateLimitSnapshot {
        *self.limits.lock().unwrap()
    }

    /// Fetches the newest items across all requested subreddits in a single
    /// batched request (topics joined into one listing path).
    pub async fn fetch_batch(&self, subreddits: &[String]) -> Result<Vec<Hit>, CoreError> {
        if subreddits.is_empty() {
            return Ok(Vec::new());
        }

        {
            let limits = self.limits.lock().unwrap();
            if limits.remaining < RATE_LIMIT_THRESHOLD {
                warn!(
                    remaining = limits.remaining,
                    "quota threshold reached pre-flight"
                );
                return Err(ApiError::RateLimitExceeded {
                    reset_after: limits.reset.max(0.0) as u64,
                }
                .into());
            }
        }

        let url = self.listing_url(subreddits)?;
        let mut attempt: u32 = 0;

        loop {
            let result = self
                .http
                .get(url.clone())
                .query(&[("limit", MAX_RESULT_LIMIT)])
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    if attempt < MAX_RETRIES && (e.is_timeout() || e.is_connect()) {
                        let delay = retry_delay(attempt);
                        debug!("transport error, retrying in {:?}: {e}", delay);
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(if e.is_timeout() {
                        ApiError::RequestTimeout.into()
                    } else {
                        CoreError::Network(e)
                    });
                }
            };

            self.update_limits(response.headers());
            let status = response.status();

            if status.is_success() {
                let json: Value = response.json().await.map_err(|e| {
                    error!("failed to read listing body: {e}");
                    CoreError::Api(ApiError::InvalidResponse {
                        details: "unparsable listing body".to_string(),
                    })
                })?;
                let hits = parser::parse_listing(&json);
                info!(
                    "fetched {} items from {} subreddits",
                    hits.len(),
                    subreddits.len()
                );
                return Ok(hits);
            }

            let code = status.as_u16();
            if RETRYABLE_STATUS.contains(&code) && attempt < MAX_RETRIES {
                let delay = retry_delay(attempt);
                warn!("upstream returned {code}, retrying in {:?}", delay);
                sleep(delay).await;
                attempt += 1;
                continue;
            }

            return Err(match code {
                429 => {
                    let reset = self.limits.lock().unwrap().reset;
                    ApiError::RateLimitExceeded {
                        reset_after: if reset > 0.0 { reset as u64 } else { 60 },
                    }
                    .into()
                }
                408 => ApiError::RequestTimeout.into(),
                code if status.is_server_error() => {
                    ApiError::ServerError { status_code: code }.into()
                }
                code => ApiError::UnexpectedStatus { status_code: code }.into(),
            });
        }
    }

    fn listing_url(&self, subreddits: &[String]) -> Result<Url, CoreError> {
        let raw = format!("{}/r/{}/new.json", self.base_url, subreddits.join("+"));
        Url::parse(&raw).map_err(|e| CoreError::Internal {
            message: format!("bad listing url {raw}: {e}"),
        })
    }

    /// Updates quota counters from `x-ratelimit-*` headers. The public
    /// endpoints do not always return them, so present values are trusted
    /// optimistically and absent ones leave the counters untouched.
    fn update_limits(&self, headers: &HeaderMap) {
        let mut limits = self.limits.lock().unwrap();
        if let Some(remaining) = header_f64(headers, "x-ratelimit-remaining") {
            limits.remaining = remaining;
        }
        if let Some(reset) = header_f64(headers, "x-ratelimit-reset") {
            limits.reset = reset;
        }
        if let Some(used) = header_f64(headers, "x-ratelimit-used") {
            limits.used = used;
        }
        debug!(
            remaining = limits.remaining,
            reset = limits.reset,
            "rate limit counters updated"
        );
    }
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn retry_delay(attempt: u32) -> Duration {
    let base = RETRY_BASE_DELAY_MS * 2u64.saturating_pow(attempt);
    let jitter = fastrand::u64(0..=((base as f64 * RETRY_JITTER_FACTOR) as u64));
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_url_joins_subreddits() {
        let client = RedditClient::new().expect("client");
        let url = client
            .listing_url(&["rust".to_string(), "jobs".to_string()])
            .expect("url");
        assert_eq!(url.as_str(), "https://www.reddit.com/r/rust+jobs/new.json");
    }

    #[test]
    fn retry_delay_grows_with_attempts() {
        let first = retry_delay(0);
        let third = retry_delay(2);
        assert!(first >= Duration::from_millis(500));
        assert!(first <= Duration::from_millis(600));
        assert!(third >= Duration::from_millis(2000));
        assert!(third <= Duration::from_millis(2400));
    }

    #[test]
    fn header_parsing_tolerates_garbage() {
        let mut headers = HeaderMap::new();
        headers.insert("x-ratelimit-remaining", "42.5".parse().unwrap());
        headers.insert("x-ratelimit-reset", "soon".parse().unwrap());
        assert_eq!(header_f64(&headers, "x-ratelimit-remaining"), Some(42.5));
        assert_eq!(header_f64(&headers, "x-ratelimit-reset"), None);
        assert_eq!(header_f64(&headers, "x-ratelimit-used"), None);
    }

    #[tokio::test]
    async fn empty_subreddit_list_short_circuits() {
        let client = RedditClient::new().expect("client");
        let hits = client.fetch_batch(&[]).await.expect("empty batch");
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn preflight_check_fails_without_network() {
        // Unroutable base URL proves no request is attempted.
        let client = RedditClient::new()
            .expect("client")
            .with_base_url("http://127.0.0.1:1")
            .with_initial_limits(RateLimitSnapshot {
                remaining: 2.0,
                reset: 30.0,
                used: 98.0,
            });

        let err = client
            .fetch_batch(&["rust".to_string()])
            .await
            .expect_err("should fail pre-flight");
        assert_eq!(err.rate_limit_reset(), Some(30));
    }
}
