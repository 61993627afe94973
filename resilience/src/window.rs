//! Sliding-window rate limiter.
//!
//! Keeps the timestamps of admitted requests, pruned on every check. The
//! capacity bound is enforced *before* a request is admitted, never after,
//! so no trailing window ever contains more than `max_requests` entries.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Outcome of a rate-limit admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Capacity available; caller should record the request and proceed.
    Proceed,
    /// Window full; capacity frees up after the given wait.
    Wait(Duration),
    /// Window full and the wait exceeds the configured cap; abort the call.
    Reject(Duration),
}

/// Sliding request window.
///
/// Like [`CircuitBreaker`], not internally synchronized; the manager holds
/// it behind a mutex.
///
/// [`CircuitBreaker`]: crate::CircuitBreaker
#[derive(Debug)]
pub struct RateLimitWindow {
    request_timestamps: VecDeque<Instant>,
    max_requests: usize,
    window: Duration,
    max_wait: Duration,
}

impl RateLimitWindow {
    pub fn new(max_requests: usize, window: Duration, max_wait: Duration) -> Self {
        Self {
            request_timestamps: VecDeque::new(),
            max_requests,
            window,
            max_wait,
        }
    }

    /// Number of requests currently inside the window.
    pub fn len(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.request_timestamps.len()
    }

    pub fn is_empty(&mut self, now: Instant) -> bool {
        self.len(now) == 0
    }

    /// Discard entries older than the window.
    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.request_timestamps.front() {
            if now.duration_since(*oldest) >= self.window {
                self.request_timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    /// Admission check. Does not record the request.
    pub fn check(&mut self, now: Instant) -> Admission {
        self.prune(now);
        if self.request_timestamps.len() < self.max_requests {
            return Admission::Proceed;
        }
        // Window full: wait until the oldest entry expires.
        let wait = match self.request_timestamps.front() {
            Some(oldest) => self.window.saturating_sub(now.duration_since(*oldest)),
            None => Duration::ZERO,
        };
        if wait <= self.max_wait {
            Admission::Wait(wait)
        } else {
            Admission::Reject(wait)
        }
    }

    /// Record an admitted request.
    pub fn record(&mut self, now: Instant) {
        self.request_timestamps.push_back(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn window(max_requests: usize) -> RateLimitWindow {
        RateLimitWindow::new(max_requests, Duration::from_secs(3600), Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn admits_up_to_capacity() {
        let mut w = window(3);
        let now = Instant::now();
        for _ in 0..3 {
            assert_eq!(w.check(now), Admission::Proceed);
            w.record(now);
        }
        assert_ne!(w.check(now), Admission::Proceed);
        assert_eq!(w.len(now), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn full_window_with_short_wait_asks_to_sleep() {
        let mut w = RateLimitWindow::new(
            2,
            Duration::from_secs(90),
            Duration::from_secs(60),
        );
        let start = Instant::now();
        w.record(start);
        w.record(start);

        tokio::time::advance(Duration::from_secs(40)).await;
        // Oldest entry expires in 50s, under the 60s cap.
        assert_eq!(w.check(Instant::now()), Admission::Wait(Duration::from_secs(50)));
    }

    #[tokio::test(start_paused = true)]
    async fn full_window_with_long_wait_rejects() {
        let mut w = window(1);
        w.record(Instant::now());
        // Oldest expires in a full hour; far beyond the 60s cap.
        match w.check(Instant::now()) {
            Admission::Reject(wait) => assert_eq!(wait, Duration::from_secs(3600)),
            other => panic!("expected Reject, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn old_entries_are_pruned() {
        let mut w = window(2);
        w.record(Instant::now());
        w.record(Instant::now());
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(w.check(Instant::now()), Admission::Proceed);
        assert!(w.is_empty(Instant::now()));
    }

    #[tokio::test(start_paused = true)]
    async fn bound_holds_across_partial_expiry() {
        let mut w = window(2);
        w.record(Instant::now());
        tokio::time::advance(Duration::from_secs(1800)).await;
        w.record(Instant::now());
        assert_ne!(w.check(Instant::now()), Admission::Proceed);

        // First entry ages out; one slot frees up.
        tokio::time::advance(Duration::from_secs(1800)).await;
        assert_eq!(w.check(Instant::now()), Admission::Proceed);
        assert_eq!(w.len(Instant::now()), 1);
    }
}
