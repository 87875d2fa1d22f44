//! Fetch error classification

use gtfsrt_resilience::Retryable;
use thiserror::Error;

/// HTTP status codes that are never retried: the request or the feed
/// configuration is wrong and repeating it cannot help.
pub const NON_RETRYABLE_STATUS_CODES: [u16; 5] = [400, 401, 403, 404, 410];

/// Errors from a single feed fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Client-side error status; retrying cannot succeed
    #[error("HTTP {status}: non-retryable")]
    NonRetryable { status: u16 },

    /// Server error status (retryable)
    #[error("HTTP {status}")]
    HttpStatus { status: u16 },

    /// Request or body-read timeout (retryable)
    #[error("request timed out: {0}")]
    Timeout(#[source] reqwest::Error),

    /// Connection/transport failure (retryable)
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// Invalid credential material for a header or query placement
    #[error("invalid auth for {key:?}: {message}")]
    Auth { key: String, message: String },
}

impl FetchError {
    /// Classify a reqwest error into timeout vs transport.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(err)
        } else {
            FetchError::Transport(err)
        }
    }

    /// Label used on error counters (`timeout`, `transport`, `http_{code}`).
    pub fn error_type(&self) -> String {
        match self {
            FetchError::NonRetryable { status } | FetchError::HttpStatus { status } => {
                format!("http_{status}")
            }
            FetchError::Timeout(_) => "timeout".to_string(),
            FetchError::Transport(_) => "transport".to_string(),
            FetchError::Auth { .. } => "unknown".to_string(),
        }
    }
}

impl Retryable for FetchError {
    fn is_retryable(&self) -> bool {
        match self {
            FetchError::NonRetryable { .. } | FetchError::Auth { .. } => false,
            FetchError::HttpStatus { .. } | FetchError::Timeout(_) | FetchError::Transport(_) => {
                true
            }
        }
    }
}
