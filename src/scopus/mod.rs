//! Scopus Search API transport: one request per page, no pagination state.

pub mod types;

use std::env;
use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use types::Selector;

const API_BASE: &str = "https://api.elsevier.com";
const SEARCH_PATH: &str = "/content/search/scopus";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ScopusError {
    #[error("SCOPUS_API_KEY not set. Get one at https://dev.elsevier.com")]
    ApiKeyNotSet,

    #[error("Scopus API rate limit exceeded. Please retry later.")]
    RateLimited,

    #[error("Scopus API key quota exhausted{}", reset_hint(.reset))]
    QuotaExceeded { reset: Option<u64> },

    #[error("Scopus API status {code}: {message}")]
    Api { code: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid API base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Unexpected response payload: {0}")]
    Decode(String),
}

/// One page of search results for `query`, starting at `start`.
/// Implemented by `ScopusClient` for production; mock implementations used in tests.
pub trait SearchApi {
    async fn search_page(
        &self,
        query: &str,
        selector: &Selector,
        count: u32,
        start: u64,
    ) -> Result<Value, ScopusError>;
}

#[derive(Clone)]
struct ApiKey(String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

#[derive(Clone, Debug)]
pub struct ScopusClient {
    http: Client,
    api_key: ApiKey,
    base_url: String,
}

impl ScopusClient {
    pub fn from_env(http: Client) -> Result<Self, ScopusError> {
        let api_key = env::var("SCOPUS_API_KEY").map_err(|_| ScopusError::ApiKeyNotSet)?;
        if api_key.trim().is_empty() {
            return Err(ScopusError::ApiKeyNotSet);
        }
        let base_url = env::var("SCOPUS_API_BASE")
            .ok()
            .map(|b| b.trim().trim_end_matches('/').to_string())
            .filter(|b| !b.is_empty())
            .unwrap_or_else(|| API_BASE.to_string());
        Ok(Self {
            http,
            api_key: ApiKey(api_key.trim().to_string()),
            base_url,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(http: Client, base_url: &str) -> Self {
        Self {
            http,
            api_key: ApiKey("test-key".to_string()),
            base_url: base_url.to_string(),
        }
    }

    async fn get_page(
        &self,
        query: &str,
        selector: &Selector,
        count: u32,
        start: u64,
    ) -> Result<Value, ScopusError> {
        let (selector_name, selector_value) = selector.as_param();
        let count = count.to_string();
        let start = start.to_string();
        let url = url::Url::parse_with_params(
            &format!("{}{SEARCH_PATH}", self.base_url),
            &[
                ("query", query),
                (selector_name, selector_value),
                ("count", count.as_str()),
                ("start", start.as_str()),
            ],
        )?;

        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header("X-ELS-APIKey", &self.api_key.0)
            .header("User-Agent", crate::USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        debug!(url = %response.url(), "search request sent");

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(classify_throttle(response.headers()));
        }

        let text = response.text().await?;
        if status != reqwest::StatusCode::OK {
            let message = extract_error_message(&text);
            warn!(status = %status, %message, "Scopus API error");
            return Err(ScopusError::Api {
                code: status.as_u16(),
                message,
            });
        }

        serde_json::from_str(&text).map_err(|e| ScopusError::Decode(e.to_string()))
    }
}

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 1000;

impl SearchApi for ScopusClient {
    async fn search_page(
        &self,
        query: &str,
        selector: &Selector,
        count: u32,
        start: u64,
    ) -> Result<Value, ScopusError> {
        let mut attempt = 0;
        loop {
            let err = match self.get_page(query, selector, count, start).await {
                Ok(page) => return Ok(page),
                Err(e) => e,
            };
            attempt += 1;
            match retry_delay(&err, attempt) {
                Some(delay) => {
                    debug!(
                        attempt,
                        start,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying page"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }
}

/// Scopus answers 429 both for short-term throttling and for an exhausted weekly key
/// quota; only the `X-ELS-Status` header tells them apart.
fn classify_throttle(headers: &reqwest::header::HeaderMap) -> ScopusError {
    let els_status = headers
        .get("X-ELS-Status")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if els_status.contains("QUOTA_EXCEEDED") {
        let reset = headers
            .get("X-RateLimit-Reset")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok());
        warn!(?reset, "Scopus API key quota exhausted");
        return ScopusError::QuotaExceeded { reset };
    }
    warn!("Scopus API rate limited");
    ScopusError::RateLimited
}

fn reset_hint(reset: &Option<u64>) -> String {
    reset
        .map(|epoch| format!(" (resets at unix time {epoch})"))
        .unwrap_or_default()
}

/// Delay before retry number `attempt` (1-based), or `None` when `err` is final.
/// Only throttling and 5xx (`GENERAL_SYSTEM_ERROR`, gateway timeouts) are retried.
fn retry_delay(err: &ScopusError, attempt: u32) -> Option<Duration> {
    let transient = matches!(
        err,
        ScopusError::RateLimited | ScopusError::Api { code: 500..=599, .. }
    );
    (transient && attempt < MAX_ATTEMPTS)
        .then(|| Duration::from_millis(jittered_backoff(attempt - 1)))
}

/// Equal jitter backoff: base/2 + rand(0, base/2).
fn jittered_backoff(attempt: u32) -> u64 {
    let base = INITIAL_BACKOFF_MS << attempt;
    let half = base / 2;
    half + fastrand::u64(..half.max(1))
}

/// Pull a readable message out of a Scopus error body, falling back to a body snippet.
fn extract_error_message(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let structured = parsed.as_ref().and_then(|v| {
        [
            "/service-error/status/statusText",
            "/error-response/error-message",
            "/message",
            "/error",
        ]
        .iter()
        .find_map(|pointer| v.pointer(pointer).and_then(Value::as_str))
        .map(String::from)
    });
    structured.unwrap_or_else(|| body.chars().take(200).collect())
}
