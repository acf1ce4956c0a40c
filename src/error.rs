//! Error types for the market data gateway

use std::time::Duration;
use thiserror::Error;

/// Errors produced by a single upstream fetch (after retries)
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FetchError {
    /// Connection-level failure: DNS, refused, reset, unreadable body
    #[error("Network error: {0}")]
    Network(String),

    /// The attempt exceeded its timeout
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    /// Upstream answered with a non-success status other than 429
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Upstream answered 429; the tracker is now in backoff
    #[error("Rate limit exceeded, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Upstream answered 2xx but the payload could not be used
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Timeout(_))
    }
}

/// Errors surfaced by the gateway to its callers
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    /// Upstream account is in backoff; do not retry before `retry_after_ms`
    #[error("Upstream rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Transient connectivity or timeout failure that outlived the retry budget
    #[error("Upstream network error: {0}")]
    UpstreamNetwork(String),

    /// Upstream rejected the request with a non-2xx, non-429 status
    #[error("Upstream error (HTTP {status}): {message}")]
    UpstreamBusiness { status: u16, message: String },

    /// Upstream payload did not match the expected schema
    #[error("Invalid upstream response: {0}")]
    InvalidResponse(String),

    /// Caller input rejected before any I/O
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    /// Creates a RateLimited error from the remaining backoff
    ///
    /// Rounds up to the next millisecond so that waiting `retry_after_ms`
    /// always clears the backoff window.
    pub fn rate_limited(retry_after: Duration) -> Self {
        let retry_after_ms = retry_after.as_nanos().div_ceil(1_000_000);
        Self::RateLimited {
            retry_after_ms: u64::try_from(retry_after_ms).unwrap_or(u64::MAX),
        }
    }

    /// Creates an InvalidRequest error
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a Config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Milliseconds the caller should wait, if this is a rate-limit error
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

impl From<FetchError> for GatewayError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Network(msg) => Self::UpstreamNetwork(msg),
            FetchError::Timeout(after) => {
                Self::UpstreamNetwork(format!("request timed out after {after:?}"))
            }
            FetchError::Http { status, body } => Self::UpstreamBusiness {
                status,
                message: body,
            },
            FetchError::RateLimited { retry_after_ms } => Self::RateLimited { retry_after_ms },
            FetchError::InvalidResponse(msg) => Self::InvalidResponse(msg),
        }
    }
}
