//! Provider error taxonomy and its retry classification.

use pulse_resilience::ClassifyError;
use pulse_resilience::ErrorClass;

/// Errors from GitHub API calls.
#[derive(Debug, thiserror::Error)]
pub enum GitHubError {
    /// Network-level failure (DNS, connect, timeout, broken stream).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success response that is neither auth nor rate limiting.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// Secondary or primary rate limit hit (429, or 403 with an exhausted
    /// `x-ratelimit-remaining`).
    #[error("rate limited{}", retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited {
        /// Seconds from the `Retry-After` header, when present.
        retry_after: Option<u64>,
    },

    /// Credentials rejected (401, or 403 without rate-limit markers).
    #[error("authentication rejected ({status})")]
    Auth { status: u16 },

    /// Resource does not exist. Client methods that treat absence as a
    /// normal outcome map this to `Ok(None)` before it reaches callers.
    #[error("resource not found")]
    NotFound,

    /// Response did not match the expected shape.
    #[error("parse error: {0}")]
    Parse(String),
}

impl ClassifyError for GitHubError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Network(_) => ErrorClass::Transient,
            Self::Api { status, .. } if *status >= 500 => ErrorClass::Transient,
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Auth { .. } => ErrorClass::Auth,
            Self::Api { .. } | Self::NotFound | Self::Parse(_) => ErrorClass::Permanent,
        }
    }
}
