//! Data-source clients.
//!
//! Thin wrappers over the upstream HTTP APIs the tools depend on: the
//! sports-data API and a web-search API. Both are reached through traits
//! (`SportsData`, `WebSearch`) so tools and the player resolver can be
//! exercised against in-memory fakes.
//!
//! Transport failures are translated into a typed [`ApiError`]. Transient
//! ones (timeouts, connection errors, 5xx) are retried with exponential
//! backoff by [`retry::retry_with_backoff`]; the rest fail immediately.

pub mod retry;
pub mod sports;
pub mod web_search;

use serde_json::Value;
use thiserror::Error;

use crate::config::HttpConfig;

const MAX_LOGGED_BODY: usize = 500;

/// A failed upstream call.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("could not connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("upstream returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },
}

impl ApiError {
    pub fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        let url = url.to_string();
        if err.is_timeout() {
            ApiError::Timeout { url }
        } else if err.is_connect() {
            ApiError::Connect {
                url,
                message: err.to_string(),
            }
        } else if err.is_decode() {
            ApiError::Decode {
                url,
                message: err.to_string(),
            }
        } else {
            ApiError::Request {
                url,
                message: err.to_string(),
            }
        }
    }

    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Timeout { .. } | ApiError::Connect { .. } => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::Decode { .. } | ApiError::Request { .. } => false,
        }
    }

    /// Message safe to hand to the model as `{"error": ...}`.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Timeout { .. } => "The upstream API did not respond in time.".to_string(),
            ApiError::Connect { .. } | ApiError::Request { .. } => {
                "Could not connect to the upstream API.".to_string()
            }
            ApiError::Status { status, body } => {
                format!("API request failed with status {}. Response: {}", status, body)
            }
            ApiError::Decode { .. } => "Received invalid data from the upstream API.".to_string(),
        }
    }
}

/// Build a reqwest client with separate connect and total-response budgets.
pub fn build_http_client(http: &HttpConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(http.connect_timeout())
        .timeout(http.request_timeout())
        .user_agent(concat!("courtside/", env!("CARGO_PKG_VERSION")))
        .build()
}

/// Check the status of a response and decode its JSON body.
pub(crate) async fn read_json(response: reqwest::Response, url: &str) -> Result<Value, ApiError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::from_reqwest(url, e))?;

    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: truncate(&body, MAX_LOGGED_BODY),
        });
    }

    serde_json::from_str(&body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        message: e.to_string(),
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max_chars).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        let url = "https://example.test".to_string();
        assert!(ApiError::Timeout { url: url.clone() }.is_transient());
        assert!(ApiError::Connect {
            url: url.clone(),
            message: "refused".into()
        }
        .is_transient());
        assert!(ApiError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ApiError::Status {
            status: 429,
            body: String::new()
        }
        .is_transient());
        assert!(!ApiError::Status {
            status: 404,
            body: String::new()
        }
        .is_transient());
        assert!(!ApiError::Decode {
            url,
            message: "eof".into()
        }
        .is_transient());
    }

    #[test]
    fn test_user_message_hides_urls() {
        let err = ApiError::Connect {
            url: "https://secret-host.test/api?key=abc".into(),
            message: "dns".into(),
        };
        assert!(!err.user_message().contains("secret-host"));

        let status = ApiError::Status {
            status: 404,
            body: "not found".into(),
        };
        assert!(status.user_message().contains("404"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc...");
    }
}
