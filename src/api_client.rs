use log::{debug, info, warn};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::thread;
use std::time::Duration;

use crate::error::Result;
use crate::retry::RetryPolicy;

/// Outcome of fetching the historical wait-time payload for one office.
/// Exactly one of these exists per slug and it is never mutated; a failed
/// fetch is data, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResult {
    pub slug: String,
    pub success: bool,
    pub data: Option<Value>,
    pub api_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub attempts_needed: u32,
}

/// HTTP client for the wait-time site. One pooled session serves the landing
/// page and every API call in the batch.
pub struct DmvClient {
    client: Client,
    base_url: String,
    policy: RetryPolicy,
}

impl DmvClient {
    pub fn new(base_url: &str, policy: RetryPolicy) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            ),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/plain, */*"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .cookie_store(true)
            .build()
            .expect("Failed to build HTTP client");

        DmvClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            policy,
        }
    }

    /// Fetches the landing page that carries the office table. Failures here
    /// are fatal for the batch, so the error propagates.
    pub fn fetch_main_page(&self) -> Result<String> {
        let response = self
            .client
            .get(&self.base_url)
            .send()?
            .error_for_status()?;
        Ok(response.text()?)
    }

    /// Fetches the daily-averages payload for `slug`, retrying transient
    /// failures with exponential backoff. Always returns a well-formed
    /// [`ApiResult`]; the remote endpoint failing every attempt is the
    /// common case and is recorded, not raised.
    pub fn fetch_wait_history(&self, slug: &str) -> ApiResult {
        let api_url = format!(
            "{}/api/wait_times_daily_averages?slug={}",
            self.base_url, slug
        );

        if slug.is_empty() {
            warn!("Refusing to query an empty slug");
            return ApiResult {
                slug: String::new(),
                success: false,
                data: None,
                api_url,
                error: Some("empty slug".to_string()),
                attempts_needed: 0,
            };
        }

        let mut last_error = String::new();
        for attempt in 1..=self.policy.max_attempts {
            match self.try_fetch(&api_url) {
                Ok(data) => {
                    info!(
                        "  Success for {} (attempt {}/{})",
                        slug, attempt, self.policy.max_attempts
                    );
                    return ApiResult {
                        slug: slug.to_string(),
                        success: true,
                        data: Some(data),
                        api_url,
                        error: None,
                        attempts_needed: attempt,
                    };
                }
                Err(e) => {
                    last_error = e.to_string();
                    warn!(
                        "  Attempt {}/{} failed for {}: {}",
                        attempt, self.policy.max_attempts, slug, last_error
                    );
                    if let Some(backoff) = self.policy.delay_before_retry(attempt) {
                        debug!("  Backing off {:?} before retry...", backoff);
                        thread::sleep(backoff);
                    }
                }
            }
        }

        warn!("  All {} attempts failed for {}", self.policy.max_attempts, slug);
        ApiResult {
            slug: slug.to_string(),
            success: false,
            data: None,
            api_url,
            error: Some(last_error),
            attempts_needed: self.policy.max_attempts,
        }
    }

    // Success means a 2xx status AND a JSON body; anything else is retried.
    fn try_fetch(&self, url: &str) -> Result<Value> {
        let response = self.client.get(url).send()?.error_for_status()?;
        Ok(response.json::<Value>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_slug_fails_without_a_request() {
        let client = DmvClient::new("http://127.0.0.1:9", RetryPolicy::default());
        let result = client.fetch_wait_history("");
        assert!(!result.success);
        assert_eq!(result.attempts_needed, 0);
        assert!(result.data.is_none());
    }

    #[test]
    fn trailing_slash_in_base_url_is_normalized() {
        let client = DmvClient::new("http://example.com/", RetryPolicy::default());
        let result = client.fetch_wait_history("");
        assert_eq!(
            result.api_url,
            "http://example.com/api/wait_times_daily_averages?slug="
        );
    }
}
