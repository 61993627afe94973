//! Error classification for retry decisions.

/// How the executor should react to a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient fault (network failure, 5xx, timeout): retry with backoff.
    Transient,
    /// Provider signalled rate limiting: retry with backoff.
    RateLimited,
    /// Authentication/authorization failure: never retry, abort the batch.
    Auth,
    /// Permanent fault (malformed response, bad request): never retry.
    Permanent,
}

/// Implemented by caller error types so the executor can classify failures
/// without knowing the provider's error shape.
pub trait ClassifyError {
    fn class(&self) -> ErrorClass;

    /// True when a retry with backoff is worthwhile.
    fn is_retryable(&self) -> bool {
        matches!(
            self.class(),
            ErrorClass::Transient | ErrorClass::RateLimited
        )
    }
}
