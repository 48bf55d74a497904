use crate::credentials::AccountCredential;
use crate::evidence::is_already_active;
use core_logic::{HttpReply, HttpRetryClient};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde_json::Value;
use tracing::warn;

const USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/130.0.0.0 Mobile Safari/537.36";

#[derive(Debug, Clone, PartialEq)]
pub enum StartOutcome {
    /// `server_time_ms` comes from the response `Date` header when present.
    Started { server_time_ms: Option<i64> },
    AlreadyActive { message: String },
    AuthExpired,
    Rejected { status: u16, message: String },
    NotSuccessful,
    NoResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed { amount: Option<String> },
    AuthExpired,
    Rejected { status: u16, message: String },
    NotSuccessful,
    NoResponse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageFetch {
    Body(String),
    AuthExpired,
    Unavailable,
}

/// Typed wrappers over the game's endpoints.
#[derive(Clone)]
pub struct DigxeApi {
    http: HttpRetryClient,
    origin: String,
}

impl DigxeApi {
    pub fn new(http: HttpRetryClient, origin: &str) -> Self {
        Self {
            http,
            origin: origin.trim_end_matches('/').to_string(),
        }
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn http(&self) -> &HttpRetryClient {
        &self.http
    }

    pub fn api_url(&self, path: &str) -> String {
        format!("{}/api{}", self.origin, path)
    }

    pub fn page_url(&self, path: &str) -> String {
        format!("{}{}", self.origin, path)
    }

    /// Browser-like JSON headers for API calls.
    pub fn headers(&self, account: &AccountCredential, referer_path: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let host = self
            .origin
            .split("://")
            .nth(1)
            .unwrap_or(self.origin.as_str());

        let pairs: [(&str, String); 11] = [
            ("authority", host.to_string()),
            ("accept", "*/*".to_string()),
            ("accept-language", "en-US,en;q=0.9".to_string()),
            ("content-type", "application/json".to_string()),
            ("origin", self.origin.clone()),
            ("referer", self.page_url(referer_path)),
            ("sec-fetch-dest", "empty".to_string()),
            ("sec-fetch-mode", "cors".to_string()),
            ("sec-fetch-site", "same-origin".to_string()),
            ("user-agent", USER_AGENT.to_string()),
            ("cookie", account.cookie().to_string()),
        ];

        for (name, value) in pairs {
            match HeaderValue::from_str(&value) {
                Ok(v) => {
                    headers.insert(HeaderName::from_static(name), v);
                }
                Err(_) => warn!("[{}] Dropping invalid '{}' header", account.label(), name),
            }
        }
        headers
    }

    /// Headers that make the Next.js frontend answer with its RSC payload.
    pub fn page_headers(&self, account: &AccountCredential, referer_path: &str) -> HeaderMap {
        let mut headers = self.headers(account, referer_path);
        headers.insert(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("text/x-component, */*"),
        );
        headers.insert(HeaderName::from_static("rsc"), HeaderValue::from_static("1"));
        headers
    }

    pub async fn start_mining(&self, account: &AccountCredential) -> StartOutcome {
        let reply = self
            .http
            .post_json(
                &self.api_url("/mining/start"),
                self.headers(account, "/dashboard"),
                None,
            )
            .await;

        let Some(reply) = reply else {
            return StartOutcome::NoResponse;
        };

        if !reply.is_success() {
            let message = reply.message();
            if reply.status.as_u16() == 400 && is_already_active(&message) {
                return StartOutcome::AlreadyActive { message };
            }
            if reply.is_auth_failure() {
                return StartOutcome::AuthExpired;
            }
            return StartOutcome::Rejected {
                status: reply.status.as_u16(),
                message,
            };
        }

        if reports_success(&reply) {
            StartOutcome::Started {
                server_time_ms: reply.server_date_ms(),
            }
        } else {
            StartOutcome::NotSuccessful
        }
    }

    pub async fn claim(&self, account: &AccountCredential) -> ClaimOutcome {
        let reply = self
            .http
            .post_json(
                &self.api_url("/claim"),
                self.headers(account, "/dashboard"),
                None,
            )
            .await;

        let Some(reply) = reply else {
            return ClaimOutcome::NoResponse;
        };

        if reply.is_auth_failure() {
            return ClaimOutcome::AuthExpired;
        }
        if !reply.is_success() {
            return ClaimOutcome::Rejected {
                status: reply.status.as_u16(),
                message: reply.message(),
            };
        }

        match reply.json_value() {
            Some(body) if body.get("success").and_then(Value::as_bool) == Some(true) => {
                ClaimOutcome::Claimed {
                    amount: body.get("claimed").and_then(display_value),
                }
            }
            _ => ClaimOutcome::NotSuccessful,
        }
    }

    /// Dashboard RSC payload, which embeds `lastClaimTime`.
    pub async fn fetch_dashboard(&self, account: &AccountCredential) -> PageFetch {
        self.fetch_page(account, "/dashboard").await
    }

    /// Mining RSC payload, which embeds the balance and device counters.
    pub async fn fetch_mining_page(&self, account: &AccountCredential) -> PageFetch {
        self.fetch_page(account, "/mining").await
    }

    async fn fetch_page(&self, account: &AccountCredential, path: &str) -> PageFetch {
        let reply = self
            .http
            .get(&self.page_url(path), self.page_headers(account, path))
            .await;
        match reply {
            Some(r) if r.is_success() => PageFetch::Body(r.body),
            Some(r) if r.is_auth_failure() => PageFetch::AuthExpired,
            _ => PageFetch::Unavailable,
        }
    }

    pub async fn get_signature(
        &self,
        account: &AccountCredential,
        path: &str,
        wallet_address: &str,
    ) -> Option<HttpReply> {
        let body = serde_json::json!({ "walletAddress": wallet_address });
        self.http
            .post_json(&self.api_url(path), self.headers(account, "/wallet"), Some(&body))
            .await
    }

    pub async fn submit_withdrawal(
        &self,
        account: &AccountCredential,
        path: &str,
        payload: &Value,
    ) -> Option<HttpReply> {
        self.http
            .post_json(
                &self.api_url(path),
                self.headers(account, "/wallet"),
                Some(payload),
            )
            .await
    }
}

/// `success == true`, or a `status` of `ok` / `success`.
pub fn reports_success(reply: &HttpReply) -> bool {
    reply.json_value().is_some_and(|body| {
        body.get("success").and_then(Value::as_bool) == Some(true)
            || matches!(
                body.get("status").and_then(Value::as_str),
                Some("ok") | Some("success")
            )
    })
}

/// Renders a JSON scalar for logs; `null` and empty strings count as absent.
pub fn display_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
