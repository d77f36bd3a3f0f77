//! Clients for the external generation providers.
//!
//! Both providers speak the OpenAI wire format and are reached over plain
//! `reqwest` so the base URLs stay configurable (and mockable in tests). The
//! error taxonomy distinguishes the kinds the pipeline treats differently:
//! credential and quota failures are never retried, content-policy rejections
//! get one softened retry (image stage only), and transient failures get a
//! bounded fixed-delay retry.

pub mod chat;
pub mod image;

pub use chat::{ChatCompletions, OpenAiChat};
pub use image::{ImageGeneration, OpenAiImages};

use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by provider calls.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider rejected the configured credentials (401/403)
    #[error("invalid provider credentials: {message}")]
    InvalidCredentials { message: String },

    /// The provider reported an exhausted quota (429)
    #[error("provider quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// The prompt was rejected by the provider's content policy
    #[error("prompt rejected by content policy: {message}")]
    ContentPolicy { message: String },

    /// The request exceeded the client timeout
    #[error("provider request timed out")]
    Timeout,

    /// Any other API error response
    #[error("provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A network-level error occurred
    #[error("network error: {0}")]
    Network(reqwest::Error),

    /// The provider returned a body we could not interpret
    #[error("unexpected provider response: {message}")]
    InvalidResponse { message: String },
}

/// Error payload shape shared by the OpenAI-style APIs:
/// `{"error": {"message": ..., "type": ..., "code": ...}}`
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize, Default)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl ProviderError {
    /// Classify a non-success HTTP response from a provider.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<ApiErrorBody>(body).map(|b| b.error).unwrap_or_default();
        let message = if detail.message.is_empty() { body.to_string() } else { detail.message };

        let marker = |field: &Option<String>, needle: &str| field.as_deref().is_some_and(|v| v.contains(needle));

        match status {
            401 | 403 => ProviderError::InvalidCredentials { message },
            429 => ProviderError::QuotaExceeded { message },
            400 if marker(&detail.code, "content_policy") || marker(&detail.kind, "content_policy") => {
                ProviderError::ContentPolicy { message }
            }
            _ => ProviderError::Api { status, message },
        }
    }

    /// Whether a bounded retry can reasonably be expected to help.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Timeout | ProviderError::Network(_) => true,
            ProviderError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Join an endpoint path onto a configured base URL without clobbering any
/// path segments the base already carries (e.g. `/v1`).
pub(crate) fn endpoint_url(base: &url::Url, path: &str) -> String {
    format!("{}/{}", base.as_str().trim_end_matches('/'), path)
}

/// Classify a reqwest transport error, keeping timeouts distinguishable.
pub(crate) fn from_reqwest(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Network(err)
    }
}

/// Run a provider call with up to `max_retries` fixed-delay retries on
/// transient failures. Non-transient failures return immediately.
pub(crate) async fn with_retries<T, F, Fut>(max_retries: u32, delay: Duration, mut op: F) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_retries => {
                attempt += 1;
                tracing::warn!(attempt, max_retries, error = %err, "transient provider error, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn classifies_auth_quota_and_content_policy() {
        let err = ProviderError::from_status(401, r#"{"error": {"message": "bad key"}}"#);
        assert!(matches!(err, ProviderError::InvalidCredentials { .. }));

        let err = ProviderError::from_status(429, r#"{"error": {"message": "insufficient_quota"}}"#);
        assert!(matches!(err, ProviderError::QuotaExceeded { .. }));

        let err = ProviderError::from_status(
            400,
            r#"{"error": {"message": "rejected", "code": "content_policy_violation"}}"#,
        );
        assert!(matches!(err, ProviderError::ContentPolicy { .. }));

        let err = ProviderError::from_status(400, r#"{"error": {"message": "bad request"}}"#);
        assert!(matches!(err, ProviderError::Api { status: 400, .. }));
    }

    #[test]
    fn falls_back_to_raw_body_when_unparseable() {
        let err = ProviderError::from_status(503, "upstream unavailable");
        match err {
            ProviderError::Api { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "upstream unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn transience_classification() {
        assert!(ProviderError::Timeout.is_transient());
        assert!(ProviderError::Api { status: 502, message: String::new() }.is_transient());
        assert!(!ProviderError::Api { status: 400, message: String::new() }.is_transient());
        assert!(!ProviderError::QuotaExceeded { message: String::new() }.is_transient());
        assert!(!ProviderError::ContentPolicy { message: String::new() }.is_transient());
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_the_limit() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(2, Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Api { status: 500, message: "boom".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn does_not_retry_terminal_errors() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retries(2, Duration::ZERO, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::QuotaExceeded { message: "no".into() }) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = with_retries(2, Duration::ZERO, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::Api { status: 500, message: "boom".into() })
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
