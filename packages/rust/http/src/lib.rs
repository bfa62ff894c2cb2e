//! Resilient HTTP client shared by every outbound call.
//!
//! [`ApiClient`] wraps a single `reqwest::Client` and retries transient
//! failures (transport errors and 429/5xx gateway statuses) with capped
//! exponential backoff. Exhausted retries degrade to `None` instead of an
//! error, so callers decide whether to skip, fall back, or record the miss.

mod request;

use std::time::Duration;

use reqwest::Client;
use tracing::{debug, warn};

use callsync_shared::{CallsyncError, HttpConfig, Result, secs_to_duration};

pub use request::{ApiRequest, ApiResponse};
pub use reqwest::{Method, StatusCode};

/// User-Agent string for all outbound requests.
const USER_AGENT: &str = concat!("callsync/", env!("CARGO_PKG_VERSION"));

/// Statuses treated as transient and retried.
pub const RETRYABLE_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded exponential backoff without jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per call, including the first (at least 1).
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&HttpConfig::default())
    }
}

impl From<&HttpConfig> for RetryPolicy {
    fn from(config: &HttpConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: secs_to_duration(config.backoff_base_secs),
            max_delay: secs_to_duration(config.backoff_cap_secs),
        }
    }
}

impl RetryPolicy {
    /// Delay to wait before retry number `retry` (0-based): `base * 2^retry`, capped.
    pub fn delay_for(&self, retry: u32) -> Duration {
        1u32.checked_shl(retry)
            .and_then(|factor| self.base_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

/// Whether a status code is worth another attempt.
pub fn is_retryable_status(status: StatusCode) -> bool {
    RETRYABLE_STATUSES.contains(&status.as_u16())
}

// ---------------------------------------------------------------------------
// ApiClient
// ---------------------------------------------------------------------------

/// HTTP client with retry/backoff, constructed once per run and passed to
/// every component that talks to the network.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Build a client from the `[http]` config section.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        Self::with_policy(
            RetryPolicy::from(config),
            Duration::from_secs(config.timeout_secs.max(1)),
        )
    }

    /// Build a client with an explicit policy and per-call timeout.
    pub fn with_policy(policy: RetryPolicy, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CallsyncError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, policy })
    }

    /// Send a request, retrying transient failures.
    ///
    /// Returns the first non-retryable response as-is, whatever its status.
    /// Returns `None` once every attempt failed at the transport level or
    /// with a retryable status.
    pub async fn send(&self, request: &ApiRequest) -> Option<ApiResponse> {
        let attempts = self.policy.max_attempts.max(1);

        for attempt in 0..attempts {
            match self.send_once(request).await {
                Ok(response) if is_retryable_status(response.status()) => {
                    warn!(
                        method = %request.method(),
                        url = request.url(),
                        status = response.status().as_u16(),
                        attempt = attempt + 1,
                        "transient HTTP status"
                    );
                }
                Ok(response) => {
                    debug!(
                        method = %request.method(),
                        url = request.url(),
                        status = response.status().as_u16(),
                        "request completed"
                    );
                    return Some(response);
                }
                Err(e) => {
                    warn!(
                        method = %request.method(),
                        url = request.url(),
                        attempt = attempt + 1,
                        error = %e,
                        "request failed"
                    );
                }
            }

            if attempt + 1 < attempts {
                tokio::time::sleep(self.policy.delay_for(attempt)).await;
            }
        }

        warn!(
            method = %request.method(),
            url = request.url(),
            attempts,
            "retries exhausted, treating as unavailable"
        );
        None
    }

    /// One attempt: build, send, and read the full body.
    async fn send_once(&self, request: &ApiRequest) -> std::result::Result<ApiResponse, reqwest::Error> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url());

        if !request.query_params().is_empty() {
            builder = builder.query(request.query_params());
        }
        for (name, value) in request.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(token) = request.bearer_token() {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        Ok(ApiResponse::new(status, body))
    }
}
