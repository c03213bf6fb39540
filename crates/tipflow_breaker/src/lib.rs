//! C. CircuitBreaker: guards the upstream against cascaded failure.
//! Ported from `original_source/common/rate_limiter.py`'s
//! `CircuitBreaker`, kept process-wide via a single `Mutex` guarding all
//! state transitions and window mutations.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Returned by [`CircuitBreaker::before_request`] when the circuit denies the
/// attempt outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("circuit breaker is open")]
pub struct CircuitOpenError;

pub struct CircuitBreakerConfig {
    pub window_size: usize,
    pub failure_threshold: f64,
    pub recovery_threshold: f64,
    pub open_duration: Duration,
}

impl From<&tipflow_config::CircuitBreakerConfig> for CircuitBreakerConfig {
    fn from(c: &tipflow_config::CircuitBreakerConfig) -> Self {
        CircuitBreakerConfig {
            window_size: c.window_size,
            failure_threshold: c.failure_threshold,
            recovery_threshold: c.recovery_threshold,
            open_duration: Duration::from_secs(c.open_duration_secs),
        }
    }
}

struct Inner {
    state: CircuitState,
    window: VecDeque<bool>,
    opened_at: Option<Instant>,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        CircuitBreaker {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
            }),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    /// Call before issuing an upstream request.
    pub fn before_request(&self) -> Result<(), CircuitOpenError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Ok(()),
            CircuitState::Open => {
                let opened_at = inner.opened_at.expect("Open state always has opened_at");
                if opened_at.elapsed() >= self.config.open_duration {
                    inner.state = CircuitState::HalfOpen;
                    inner.window.clear();
                    info!("circuit breaker transitioning Open -> HalfOpen");
                    Ok(())
                } else {
                    Err(CircuitOpenError)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        push_outcome(&mut inner.window, self.config.window_size, true);
        match inner.state {
            CircuitState::HalfOpen => {
                let rate = failure_rate(&inner.window);
                if rate <= self.config.recovery_threshold {
                    inner.state = CircuitState::Closed;
                    inner.opened_at = None;
                    info!(failure_rate = rate, "circuit breaker HalfOpen -> Closed");
                }
            }
            CircuitState::Closed => {
                self.maybe_open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        push_outcome(&mut inner.window, self.config.window_size, false);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("circuit breaker HalfOpen -> Open");
            }
            CircuitState::Closed => {
                self.maybe_open(&mut inner);
            }
            CircuitState::Open => {}
        }
    }

    fn maybe_open(&self, inner: &mut Inner) {
        if inner.window.len() >= self.config.window_size {
            let rate = failure_rate(&inner.window);
            if rate > self.config.failure_threshold {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(failure_rate = rate, "circuit breaker Closed -> Open");
            }
        }
    }
}

fn push_outcome(window: &mut VecDeque<bool>, capacity: usize, success: bool) {
    if window.len() >= capacity.max(1) {
        window.pop_front();
    }
    window.push_back(success);
}

fn failure_rate(window: &VecDeque<bool>) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    let failures = window.iter().filter(|ok| !**ok).count();
    failures as f64 / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(window_size: usize) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            window_size,
            failure_threshold: 0.5,
            recovery_threshold: 0.3,
            open_duration: Duration::from_millis(50),
        })
    }

    #[test]
    fn opens_when_failure_fraction_exceeds_threshold() {
        let cb = breaker(20);
        for _ in 0..11 {
            cb.record_failure();
        }
        for _ in 0..9 {
            cb.record_success();
        }
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.before_request().is_err());
    }

    #[test]
    fn stays_closed_below_window_size() {
        let cb = breaker(20);
        for _ in 0..5 {
            cb.record_failure();
        }
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.before_request().is_ok());
    }

    #[test]
    fn half_opens_after_cooldown_and_closes_on_success() {
        let cb = breaker(4);
        for _ in 0..3 {
            cb.record_failure();
        }
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        std::thread::sleep(Duration::from_millis(60));
        assert!(cb.before_request().is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_failure_reopens() {
        let cb = breaker(4);
        for _ in 0..4 {
            cb.record_failure();
        }
        std::thread::sleep(Duration::from_millis(60));
        cb.before_request().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
