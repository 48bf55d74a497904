//! # HTTP Retry Client
//!
//! Every outbound call to the game service goes through [`HttpRetryClient`].
//!
//! - 429 / 503 and transport failures (timeout, refused connection, broken
//!   body) are retried with linear backoff up to the configured attempt count.
//! - Any other status, 2xx or not, is handed back untouched so the caller can
//!   tell expired credentials from a business rejection.
//! - Running out of attempts yields `None`, which is distinct from every
//!   HTTP error response.

use crate::config::HttpConfig;
use crate::error::NetworkError;
use crate::utils::retry::{is_retryable_status, RetryConfig};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, DATE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

const SNIPPET_LIMIT: usize = 500;

/// A fully buffered response.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// 401 / 403: the credential was rejected.
    pub fn is_auth_failure(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED || self.status == StatusCode::FORBIDDEN
    }

    pub fn json<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_str(&self.body).ok()
    }

    pub fn json_value(&self) -> Option<Value> {
        self.json::<Value>()
    }

    /// Human readable message from an error body: `error`, then `message`,
    /// then the whole JSON document, then the raw text.
    pub fn message(&self) -> String {
        match self.json_value() {
            Some(value) => {
                let field = value
                    .get("error")
                    .filter(|v| !v.is_null())
                    .or_else(|| value.get("message").filter(|v| !v.is_null()));
                match field {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => value.to_string(),
                }
            }
            None => self.snippet(),
        }
    }

    /// Body clipped for logging.
    pub fn snippet(&self) -> String {
        if self.body.chars().count() > SNIPPET_LIMIT {
            let clipped: String = self.body.chars().take(SNIPPET_LIMIT).collect();
            format!("{}…", clipped)
        } else {
            self.body.clone()
        }
    }

    /// The server's clock as reported by the `Date` header, in epoch ms.
    pub fn server_date_ms(&self) -> Option<i64> {
        let raw = self.headers.get(DATE)?.to_str().ok()?;
        parse_http_date_ms(raw)
    }
}

/// Parses an RFC 7231 `Date` header value (`Sun, 06 Nov 1994 08:49:37 GMT`).
pub fn parse_http_date_ms(raw: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

#[derive(Clone)]
pub struct HttpRetryClient {
    client: Client,
    retry: RetryConfig,
}

impl HttpRetryClient {
    pub fn new(config: &HttpConfig) -> Result<Self, NetworkError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .build()
            .map_err(|e| NetworkError::ClientBuild {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            retry: RetryConfig::new(config.max_attempts, config.backoff_base_ms),
        })
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry
    }

    /// A copy that never retries. Used for cheap checks where a stale answer
    /// is better than a slow one.
    pub fn single_shot(&self) -> Self {
        Self {
            client: self.client.clone(),
            retry: self.retry.single_shot(),
        }
    }

    pub async fn post_json(
        &self,
        url: &str,
        headers: HeaderMap,
        body: Option<&Value>,
    ) -> Option<HttpReply> {
        self.execute(url, || {
            let request = self.client.post(url).headers(headers.clone());
            match body {
                Some(json) => request.json(json),
                None => request,
            }
        })
        .await
    }

    pub async fn get(&self, url: &str, headers: HeaderMap) -> Option<HttpReply> {
        self.execute(url, || self.client.get(url).headers(headers.clone()))
            .await
    }

    pub async fn head(&self, url: &str) -> Option<HttpReply> {
        self.execute(url, || self.client.head(url)).await
    }

    async fn execute<F>(&self, url: &str, build: F) -> Option<HttpReply>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.retry.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if is_retryable_status(status) {
                        warn!(
                            "HTTP {} on {} (rate-limit/maintenance). Retry {}/{}",
                            status.as_u16(),
                            url,
                            attempt,
                            max_attempts
                        );
                        self.retry.backoff(attempt).await;
                        continue;
                    }

                    let headers = response.headers().clone();
                    match response.text().await {
                        Ok(body) => {
                            return Some(HttpReply {
                                status,
                                headers,
                                body,
                            })
                        }
                        Err(e) => {
                            warn!(
                                "Failed reading body from {}: {}. Retry {}/{}",
                                url, e, attempt, max_attempts
                            );
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        "Request error {}: {}. Retry {}/{}",
                        url, e, attempt, max_attempts
                    );
                }
            }
            self.retry.backoff(attempt).await;
        }

        None
    }
}
