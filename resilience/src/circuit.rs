//! Circuit breaker for cascading failure prevention.
//!
//! State machine: `Closed` during normal operation; `Open` after
//! `failure_threshold` consecutive failures (all calls rejected without
//! touching the network); `HalfOpen` once `recovery_timeout` has elapsed,
//! admitting a bounded number of probe calls. A single probe failure reverts
//! to `Open`; a probe success closes the circuit.

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use tokio::time::Instant;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker state machine.
///
/// Not internally synchronized: the owning [`ResilienceManager`] serializes
/// access behind a mutex while the actual network calls stay concurrent.
///
/// [`ResilienceManager`]: crate::ResilienceManager
#[derive(Debug)]
pub struct CircuitBreaker {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_time: Option<Instant>,
    half_open_probes: u32,
    failure_threshold: u32,
    recovery_timeout: Duration,
    half_open_max_requests: u32,
}

impl CircuitBreaker {
    pub fn new(
        failure_threshold: u32,
        recovery_timeout: Duration,
        half_open_max_requests: u32,
    ) -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_time: None,
            half_open_probes: 0,
            failure_threshold,
            recovery_timeout,
            half_open_max_requests,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Pre-flight admission check. Performs no I/O.
    ///
    /// Returns `true` when the call may proceed. Transitions `Open` to
    /// `HalfOpen` once the recovery timeout has elapsed since the last
    /// recorded failure, counting the admitted call as a probe.
    pub fn preflight(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::Closed => true,
            CircuitState::Open => match self.last_failure_time {
                Some(failed_at) if now.duration_since(failed_at) >= self.recovery_timeout => {
                    tracing::info!(elapsed = ?now.duration_since(failed_at), "circuit half-open, admitting probe");
                    self.state = CircuitState::HalfOpen;
                    self.half_open_probes = 1;
                    true
                }
                _ => false,
            },
            CircuitState::HalfOpen => {
                if self.half_open_probes < self.half_open_max_requests {
                    self.half_open_probes += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful call outcome.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        if self.state == CircuitState::HalfOpen {
            tracing::info!("circuit closed after successful probe");
            self.state = CircuitState::Closed;
            self.half_open_probes = 0;
        }
    }

    /// Record a failed call outcome.
    pub fn record_failure(&mut self, now: Instant) {
        self.consecutive_failures += 1;
        self.last_failure_time = Some(now);
        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.failure_threshold {
                    tracing::warn!(
                        failures = self.consecutive_failures,
                        "failure threshold reached, circuit open"
                    );
                    self.state = CircuitState::Open;
                }
            }
            // A single probe failure aborts recovery.
            CircuitState::HalfOpen => {
                tracing::warn!("probe failed, circuit re-opened");
                self.state = CircuitState::Open;
                self.half_open_probes = 0;
            }
            CircuitState::Open => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(5, Duration::from_secs(60), 3)
    }

    #[tokio::test(start_paused = true)]
    async fn opens_after_exact_failure_threshold() {
        let mut cb = breaker();
        let now = Instant::now();
        for _ in 0..4 {
            cb.record_failure(now);
            assert_eq!(cb.state(), CircuitState::Closed);
        }
        cb.record_failure(now);
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.consecutive_failures(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn open_rejects_until_recovery_timeout() {
        let mut cb = breaker();
        for _ in 0..5 {
            cb.record_failure(Instant::now());
        }
        assert!(!cb.preflight(Instant::now()));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!cb.preflight(Instant::now()));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cb.preflight(Instant::now()));
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_success_closes() {
        let mut cb = breaker();
        for _ in 0..5 {
            cb.record_failure(Instant::now());
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.preflight(Instant::now()));
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reverts_to_open() {
        let mut cb = breaker();
        for _ in 0..5 {
            cb.record_failure(Instant::now());
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.preflight(Instant::now()));
        cb.record_failure(Instant::now());
        assert_eq!(cb.state(), CircuitState::Open);

        // The fresh failure restarts the recovery clock.
        assert!(!cb.preflight(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_bounds_probe_count() {
        let mut cb = breaker();
        for _ in 0..5 {
            cb.record_failure(Instant::now());
        }
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(cb.preflight(Instant::now()));
        assert!(cb.preflight(Instant::now()));
        assert!(cb.preflight(Instant::now()));
        // Fourth concurrent probe is rejected.
        assert!(!cb.preflight(Instant::now()));
    }
}
