//! JSON-over-HTTP transport shared by the chat and embedding clients.
//!
//! # Retry Strategy
//!
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)

use std::time::Duration;

use notegraph_core::error::{Error, Result, ServiceKind};
use notegraph_core::generation::truncate_chars;

/// A reqwest client bound to one service, with timeout and retry policy.
#[derive(Clone)]
pub struct JsonClient {
    http: reqwest::Client,
    service: ServiceKind,
    api_key: Option<String>,
    max_retries: u32,
    backoff_base: Duration,
}

impl JsonClient {
    pub fn new(
        service: ServiceKind,
        api_key: Option<String>,
        timeout_secs: u64,
        max_retries: u32,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::service(service, format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            service,
            api_key,
            max_retries,
            backoff_base: Duration::from_secs(1),
        })
    }

    /// Override the first backoff delay (doubles on every retry).
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    /// POST `body` to `url` and decode the JSON response.
    pub async fn post_json(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff_base * (1u32 << (attempt - 1).min(5));
                tracing::warn!(
                    service = %self.service,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "retrying request"
                );
                tokio::time::sleep(delay).await;
            }

            let mut request = self.http.post(url).json(body);
            if let Some(key) = &self.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            Error::service(self.service, format!("invalid JSON response: {}", e))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = Error::service(
                        self.service,
                        format!("HTTP {}: {}", status, truncate_chars(&body_text, 500)),
                    );

                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    let message = if e.is_timeout() {
                        format!("request to {} timed out", url)
                    } else {
                        format!("request to {} failed: {}", url, e)
                    };
                    last_err = Some(Error::service(self.service, message));
                }
            }
        }

        Err(last_err
            .unwrap_or_else(|| Error::service(self.service, "request failed after retries")))
    }
}

