//! Circuit breaker guarding upstream chain calls.
//!
//! Opens after a run of consecutive failures; after a cooldown a single
//! probe is allowed through.

use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: BreakerState,
    failures: u32,
    opened_at: Option<Instant>,
}

/// Thread-safe failure-threshold circuit breaker.
#[derive(Debug)]
pub struct Breaker {
    threshold: u32,
    cooldown: Duration,
    inner: Mutex<BreakerInner>,
}

impl Default for Breaker {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(30))
    }
}

impl Breaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold,
            cooldown,
            inner: Mutex::new(BreakerInner {
                state: BreakerState::Closed,
                failures: 0,
                opened_at: None,
            }),
        }
    }

    /// Whether a request may be issued right now. An open breaker past its
    /// cooldown transitions to half-open and admits one probe.
    pub fn check(&self) -> bool {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        match inner.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let cooled = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.cooldown)
                    .unwrap_or(false);
                if cooled {
                    inner.state = BreakerState::HalfOpen;
                    inner.opened_at = None;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        inner.state = BreakerState::Closed;
        inner.failures = 0;
        inner.opened_at = None;
    }

    pub fn failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock is not poisoned");
        inner.failures = inner.failures.saturating_add(1);
        if inner.state == BreakerState::HalfOpen || inner.failures >= self.threshold {
            inner.state = BreakerState::Open;
            inner.opened_at = Some(Instant::now());
        }
    }

    pub fn state(&self) -> BreakerState {
        self.inner
            .lock()
            .expect("breaker lock is not poisoned")
            .state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_threshold_failures() {
        let breaker = Breaker::new(2, Duration::from_millis(50));

        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.failure();
        assert!(breaker.check());
        breaker.failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(!breaker.check());
    }

    #[test]
    fn probes_after_cooldown_and_closes_on_success() {
        let breaker = Breaker::new(1, Duration::from_millis(1));

        breaker.failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(2));
        assert!(breaker.check());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.success();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn half_open_failure_reopens_immediately() {
        let breaker = Breaker::new(5, Duration::from_millis(1));

        breaker.failure();
        std::thread::sleep(Duration::from_millis(2));
        // Force half-open via a failure-triggered open first.
        breaker.failure();
        breaker.failure();
        breaker.failure();
        breaker.failure();
        assert_eq!(breaker.state(), BreakerState::Open);

        std::thread::sleep(Duration::from_millis(2));
        assert!(breaker.check());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        breaker.failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
