//! Resilience layer for outbound provider calls.
//!
//! Every network call to the activity provider goes through a single
//! [`ResilienceManager`], which layers three protections around the raw
//! request:
//!
//! - a circuit breaker that fails fast while the provider is unhealthy,
//! - a sliding-window rate limiter that never admits more than the
//!   configured number of requests per window,
//! - a retry loop with exponential backoff and jitter for transient errors.
//!
//! The manager owns no business knowledge. Callers classify their own error
//! types via [`ClassifyError`] so the executor can decide retry vs. fail-fast
//! without downcasting.

mod circuit;
mod classify;
mod manager;
mod window;

pub use circuit::CircuitBreaker;
pub use circuit::CircuitState;
pub use classify::ClassifyError;
pub use classify::ErrorClass;
pub use manager::HealthSnapshot;
pub use manager::ResilienceConfig;
pub use manager::ResilienceError;
pub use manager::ResilienceManager;
pub use window::Admission;
pub use window::RateLimitWindow;
