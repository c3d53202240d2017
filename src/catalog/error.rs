//! Errors returned by a single call against the catalog API.

use std::time::Duration;
use thiserror::Error;

/// Failure of one boundary call.
///
/// Retry decisions are taken by the batch client, based on
/// [`ApiError::is_retryable`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// Network failure, timeout or 5xx response.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// The API asked us to slow down (HTTP 429).
    #[error("Rate limited by catalog API (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other non-success status.
    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    /// The response body could not be decoded.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// The request itself was malformed (e.g. too many ids).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Returns true if the same call may succeed when issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::Transient(_) | ApiError::RateLimited { .. } | ApiError::Parse(_)
        )
    }

    /// Server-requested delay before the next attempt, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            ApiError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify a transport-level reqwest error.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else if err.is_builder() {
            ApiError::InvalidRequest(err.to_string())
        } else {
            // timeouts, connection resets, body read failures
            ApiError::Transient(err.to_string())
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: String, retry_after: Option<Duration>) -> Self {
        match status {
            429 => ApiError::RateLimited { retry_after },
            404 => ApiError::NotFound(message),
            500..=599 => ApiError::Transient(format!("status {}: {}", status, message)),
            _ => ApiError::Rejected { status, message },
        }
    }
}
