//! The resilient executor wrapping every outbound provider call.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::circuit::CircuitBreaker;
use crate::circuit::CircuitState;
use crate::classify::ClassifyError;
use crate::classify::ErrorClass;
use crate::window::Admission;
use crate::window::RateLimitWindow;

/// Tunables for the resilience layer.
///
/// Defaults match the provider limits this layer was built against: 5000
/// requests per rolling hour, a circuit that opens after 5 consecutive
/// failures and probes again after 60 seconds.
#[derive(Debug, Clone)]
pub struct ResilienceConfig {
    /// Maximum requests admitted per rolling window.
    pub max_requests: usize,
    /// Width of the rolling window.
    pub window: Duration,
    /// Longest the executor will sleep waiting for window capacity before
    /// aborting the call instead of stalling the batch.
    pub max_rate_limit_wait: Duration,
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a probe.
    pub recovery_timeout: Duration,
    /// Concurrent probes admitted while half-open.
    pub half_open_max_requests: u32,
    /// Upper bound on the exponential backoff delay.
    pub backoff_cap: Duration,
    /// Jitter added to each backoff delay, uniform in `[0, jitter_max)`.
    pub jitter_max: Duration,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_requests: 5000,
            window: Duration::from_secs(3600),
            max_rate_limit_wait: Duration::from_secs(60),
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_requests: 3,
            backoff_cap: Duration::from_secs(60),
            jitter_max: Duration::from_millis(1000),
        }
    }
}

/// Terminal outcome of an [`execute`](ResilienceManager::execute) call that
/// did not produce a value.
#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E: std::error::Error + 'static> {
    /// Circuit open: rejected without any network attempt.
    #[error("circuit open, call rejected without network attempt")]
    CircuitOpen,

    /// Rate-limit window full and the wait exceeds the cap.
    #[error("rate limit window full, next capacity in {wait:?}")]
    RateLimitExhausted { wait: Duration },

    /// Transient failures persisted through every retry.
    #[error("retries exhausted")]
    Exhausted(#[source] E),

    /// Non-retryable provider error.
    #[error("permanent provider error")]
    Permanent(#[source] E),

    /// Credentials rejected. Callers must stop issuing calls with this token.
    #[error("authentication rejected by provider")]
    Auth(#[source] E),
}

impl<E: std::error::Error + 'static> ResilienceError<E> {
    /// The underlying provider error, when one was observed.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Exhausted(e) | Self::Permanent(e) | Self::Auth(e) => Some(e),
            Self::CircuitOpen | Self::RateLimitExhausted { .. } => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// Read-only health snapshot for operators. Not consumed by business logic.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub circuit_state: CircuitState,
    pub consecutive_failures: u32,
    pub requests_in_window: usize,
    pub max_requests: usize,
    pub total_calls: u64,
    pub total_failures: u64,
    /// Calls rejected by an open circuit, without a network attempt.
    pub circuit_rejections: u64,
    /// Calls aborted because the rate-limit wait exceeded the cap.
    pub rate_limit_rejections: u64,
    /// Rolling success ratio over completed calls; 1.0 before any call.
    pub success_rate: f64,
    /// Mean latency of successful calls, in milliseconds.
    pub avg_latency_ms: f64,
}

#[derive(Debug, Default)]
struct CallStats {
    total_calls: u64,
    total_failures: u64,
    circuit_rejections: u64,
    rate_limit_rejections: u64,
    success_latency: Duration,
    successes: u64,
}

/// Wraps outbound calls with a circuit breaker, a sliding-window rate
/// limiter and exponential-backoff retries.
///
/// One instance is shared by everything that talks to a given provider; the
/// circuit and window are serialized behind mutexes while the network calls
/// themselves stay concurrent.
pub struct ResilienceManager {
    config: ResilienceConfig,
    circuit: Mutex<CircuitBreaker>,
    window: Mutex<RateLimitWindow>,
    stats: Mutex<CallStats>,
}

impl ResilienceManager {
    pub fn new(config: ResilienceConfig) -> Self {
        let circuit = CircuitBreaker::new(
            config.failure_threshold,
            config.recovery_timeout,
            config.half_open_max_requests,
        );
        let window = RateLimitWindow::new(
            config.max_requests,
            config.window,
            config.max_rate_limit_wait,
        );
        Self {
            config,
            circuit: Mutex::new(circuit),
            window: Mutex::new(window),
            stats: Mutex::new(CallStats::default()),
        }
    }

    /// Run `op` under circuit, rate-limit and retry protection.
    ///
    /// Transient and rate-limited errors are retried up to `max_retries`
    /// times with `min(cap, 2^attempt) + jitter` seconds of backoff between
    /// attempts. Auth and permanent errors fail immediately. The circuit
    /// records one outcome per `execute` call, not per attempt.
    pub async fn execute<T, E, F, Fut>(
        &self,
        op_name: &str,
        max_retries: u32,
        mut op: F,
    ) -> Result<T, ResilienceError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: ClassifyError + std::error::Error + 'static,
    {
        // Pre-flight circuit check: no I/O, fail fast while open.
        {
            let mut circuit = self.circuit.lock().await;
            if !circuit.preflight(Instant::now()) {
                drop(circuit);
                tracing::debug!(op = op_name, "circuit open, rejecting call");
                self.stats.lock().await.circuit_rejections += 1;
                return Err(ResilienceError::CircuitOpen);
            }
        }

        let mut attempt: u32 = 0;
        loop {
            self.admit(op_name).await?;

            let started = Instant::now();
            match op().await {
                Ok(value) => {
                    let latency = started.elapsed();
                    self.circuit.lock().await.record_success();
                    let mut stats = self.stats.lock().await;
                    stats.total_calls += 1;
                    stats.successes += 1;
                    stats.success_latency += latency;
                    return Ok(value);
                }
                Err(err) => match err.class() {
                    ErrorClass::Auth => {
                        tracing::error!(op = op_name, error = %err, "authentication rejected");
                        self.record_failure().await;
                        return Err(ResilienceError::Auth(err));
                    }
                    ErrorClass::Permanent => {
                        tracing::warn!(op = op_name, error = %err, "permanent error, not retrying");
                        self.record_failure().await;
                        return Err(ResilienceError::Permanent(err));
                    }
                    ErrorClass::Transient | ErrorClass::RateLimited => {
                        if attempt >= max_retries {
                            tracing::warn!(
                                op = op_name,
                                attempts = attempt + 1,
                                error = %err,
                                "retries exhausted"
                            );
                            self.record_failure().await;
                            return Err(ResilienceError::Exhausted(err));
                        }
                        let delay = self.backoff_delay(attempt);
                        tracing::debug!(
                            op = op_name,
                            attempt,
                            delay = ?delay,
                            error = %err,
                            "transient error, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                },
            }
        }
    }

    /// Current health, for operator visibility.
    pub async fn health(&self) -> HealthSnapshot {
        let (circuit_state, consecutive_failures) = {
            let circuit = self.circuit.lock().await;
            (circuit.state(), circuit.consecutive_failures())
        };
        let requests_in_window = self.window.lock().await.len(Instant::now());
        let stats = self.stats.lock().await;
        let success_rate = if stats.total_calls == 0 {
            1.0
        } else {
            stats.successes as f64 / stats.total_calls as f64
        };
        let avg_latency_ms = if stats.successes == 0 {
            0.0
        } else {
            stats.success_latency.as_secs_f64() * 1000.0 / stats.successes as f64
        };
        HealthSnapshot {
            circuit_state,
            consecutive_failures,
            requests_in_window,
            max_requests: self.config.max_requests,
            total_calls: stats.total_calls,
            total_failures: stats.total_failures,
            circuit_rejections: stats.circuit_rejections,
            rate_limit_rejections: stats.rate_limit_rejections,
            success_rate,
            avg_latency_ms,
        }
    }

    /// Wait for window capacity, recording the request once admitted.
    async fn admit<E>(&self, op_name: &str) -> Result<(), ResilienceError<E>>
    where
        E: std::error::Error + 'static,
    {
        loop {
            let admission = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                match window.check(now) {
                    Admission::Proceed => {
                        window.record(now);
                        return Ok(());
                    }
                    other => other,
                }
            };
            match admission {
                Admission::Proceed => unreachable!("handled under lock"),
                Admission::Wait(wait) => {
                    tracing::debug!(op = op_name, wait = ?wait, "rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
                Admission::Reject(wait) => {
                    tracing::warn!(op = op_name, wait = ?wait, "rate limit wait exceeds cap, aborting");
                    self.stats.lock().await.rate_limit_rejections += 1;
                    return Err(ResilienceError::RateLimitExhausted { wait });
                }
            }
        }
    }

    async fn record_failure(&self) {
        self.circuit.lock().await.record_failure(Instant::now());
        let mut stats = self.stats.lock().await;
        stats.total_calls += 1;
        stats.total_failures += 1;
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        use rand::Rng;
        let base = Duration::from_secs(2u64.saturating_pow(attempt));
        let capped = base.min(self.config.backoff_cap);
        let jitter_max = self.config.jitter_max.as_millis() as u64;
        let jitter = if jitter_max == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..jitter_max))
        };
        capped + jitter
    }
}
