//! Application error types

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by an external data provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{provider}: entity not found: {entity}")]
    NotFound { provider: String, entity: String },

    #[error("{provider}: rate limited (retry after {retry_after:?})")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("{provider}: authentication failed: {message}")]
    Auth { provider: String, message: String },

    #[error("{provider}: transient failure: {message}")]
    Transient { provider: String, message: String },

    #[error("{provider}: unexpected response shape: {message}")]
    Malformed { provider: String, message: String },
}

impl ProviderError {
    /// Transient failures are worth another attempt; everything else is permanent
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }

    /// Provider-suggested wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Operation timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether a later attempt may succeed.
    ///
    /// A timeout is an unknown outcome, so it is treated as retryable. Network
    /// failures and server-side HTTP errors are transient; not-found, auth and
    /// malformed payloads are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Provider(e) => e.is_retryable(),
            AppError::Timeout { .. } => true,
            AppError::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().map(|s| s.is_server_error()).unwrap_or(false)
            }
            AppError::RetriesExhausted { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// Provider-suggested wait before the next attempt, if any
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::Provider(e) => e.retry_after(),
            _ => None,
        }
    }
}

/// Serializable error entry for cycle summaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<&AppError> for ErrorResponse {
    fn from(err: &AppError) -> Self {
        let code = match err {
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Http(_) => "HTTP_ERROR",
            AppError::Provider(ProviderError::NotFound { .. }) => "PROVIDER_NOT_FOUND",
            AppError::Provider(ProviderError::RateLimited { .. }) => "PROVIDER_RATE_LIMITED",
            AppError::Provider(ProviderError::Auth { .. }) => "PROVIDER_AUTH",
            AppError::Provider(ProviderError::Transient { .. }) => "PROVIDER_TRANSIENT",
            AppError::Provider(ProviderError::Malformed { .. }) => "PROVIDER_MALFORMED",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::RetriesExhausted { .. } => "RETRIES_EXHAUSTED",
            AppError::Cancelled => "CANCELLED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(e: ProviderError) -> AppError {
        AppError::Provider(e)
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(provider(ProviderError::Transient {
            provider: "free_quote".into(),
            message: "502".into(),
        })
        .is_retryable());
        assert!(provider(ProviderError::RateLimited {
            provider: "free_quote".into(),
            retry_after: None,
        })
        .is_retryable());
        assert!(AppError::Timeout { after_ms: 10 }.is_retryable());
    }

    #[test]
    fn test_permanent_errors_are_not_retryable() {
        assert!(!provider(ProviderError::NotFound {
            provider: "fundamentals".into(),
            entity: "ZZZZ".into(),
        })
        .is_retryable());
        assert!(!provider(ProviderError::Auth {
            provider: "pro_market".into(),
            message: "bad key".into(),
        })
        .is_retryable());
        assert!(!AppError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn test_exhausted_error_keeps_attempt_count() {
        let err = AppError::RetriesExhausted {
            attempts: 3,
            source: Box::new(AppError::Timeout { after_ms: 50 }),
        };
        assert!(err.to_string().starts_with("Failed after 3 attempt(s)"));
        assert_eq!(ErrorResponse::from(&err).code, "RETRIES_EXHAUSTED");
    }

    #[test]
    fn test_retry_after_hint() {
        let err = provider(ProviderError::RateLimited {
            provider: "pro_market".into(),
            retry_after: Some(Duration::from_secs(2)),
        });
        assert_eq!(err.retry_after(), Some(Duration::from_secs(2)));
    }
}
