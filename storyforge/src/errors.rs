use crate::db::errors::DbError;
use crate::providers::ProviderError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Missing or malformed request data
    #[error("{message}")]
    Validation { message: String },

    /// Server-side configuration is missing or inconsistent (credentials,
    /// connection strings, limit settings)
    #[error("{message}")]
    Configuration { message: String },

    /// The provider rejected the configured credentials
    #[error("Provider rejected the configured credentials: {message}")]
    InvalidCredentials { message: String },

    /// The provider reported an exhausted quota
    #[error("Provider quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// A provider call exceeded the configured request timeout
    #[error("Provider request timed out")]
    ProviderTimeout,

    /// Text generation failed after retries were exhausted
    #[error("Story generation failed: {message}")]
    Generation { message: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
            Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::ProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            Error::Generation { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable error code included in every error response body.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Validation { .. } => "MISSING_FIELDS",
            Error::Configuration { .. } => "NOT_CONFIGURED",
            Error::InvalidCredentials { .. } => "INVALID_CREDENTIALS",
            Error::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            Error::ProviderTimeout => "PROVIDER_TIMEOUT",
            Error::Generation { .. } => "GENERATION_FAILED",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Other(_) => "INTERNAL",
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message } => message.clone(),
            Error::Configuration { message } => message.clone(),
            Error::InvalidCredentials { .. } => "The configured provider credentials were rejected".to_string(),
            Error::QuotaExceeded { .. } => "The provider quota has been exceeded; try again later".to_string(),
            Error::ProviderTimeout => "The provider took too long to respond".to_string(),
            Error::Generation { .. } => "Story generation failed".to_string(),
            Error::Database(_) => "Database error occurred".to_string(),
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::Database(_) | Error::Generation { .. } | Error::Configuration { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::InvalidCredentials { .. } | Error::QuotaExceeded { .. } | Error::ProviderTimeout => {
                tracing::warn!("Provider error: {}", self);
            }
            Error::Validation { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let body = json!({
            "code": self.code(),
            "message": self.user_message(),
        });

        (self.status_code(), Json(body)).into_response()
    }
}

/// Provider failures surfaced at the top level keep their distinguishable
/// kinds (auth, quota, timeout); everything else collapses into a generic
/// generation failure.
impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials { message } => Error::InvalidCredentials { message },
            ProviderError::QuotaExceeded { message } => Error::QuotaExceeded { message },
            ProviderError::Timeout => Error::ProviderTimeout,
            other => Error::Generation { message: other.to_string() },
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_error_taxonomy() {
        let cases = [
            (Error::Validation { message: "x".into() }, StatusCode::BAD_REQUEST),
            (Error::Configuration { message: "x".into() }, StatusCode::INTERNAL_SERVER_ERROR),
            (Error::InvalidCredentials { message: "x".into() }, StatusCode::UNAUTHORIZED),
            (Error::QuotaExceeded { message: "x".into() }, StatusCode::TOO_MANY_REQUESTS),
            (Error::ProviderTimeout, StatusCode::GATEWAY_TIMEOUT),
            (Error::Generation { message: "x".into() }, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "wrong status for {}", err.code());
        }
    }

    #[test]
    fn provider_errors_keep_their_kind() {
        let err: Error = ProviderError::QuotaExceeded { message: "insufficient_quota".into() }.into();
        assert_eq!(err.code(), "QUOTA_EXCEEDED");

        let err: Error = ProviderError::Timeout.into();
        assert_eq!(err.code(), "PROVIDER_TIMEOUT");

        let err: Error = ProviderError::Api { status: 500, message: "boom".into() }.into();
        assert_eq!(err.code(), "GENERATION_FAILED");
    }
}
