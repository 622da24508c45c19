use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::EmbeddingError;

const WINDOW: Duration = Duration::from_secs(30);
const MIN_SAMPLES: usize = 5;
const FAILURE_RATE_THRESHOLD: f64 = 0.5;
const OPEN_DURATION: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed,
    Open,
    HalfOpen,
}

struct Sample {
    at: Instant,
    success: bool,
}

/// Opens after >=5 samples in a trailing 30s window show a >=50% failure
/// rate; stays open 30s, then allows one half-open probe; closes on success,
/// reopens on failure (§5).
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
}

struct Inner {
    samples: VecDeque<Sample>,
    state: State,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                samples: VecDeque::new(),
                state: State::Closed,
                opened_at: None,
            }),
        }
    }

    /// Call before issuing a request; returns `Err(CircuitOpen)` if the
    /// breaker is tripped and the cool-down hasn't elapsed.
    pub fn check(&self) -> Result<(), EmbeddingError> {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        match inner.state {
            State::Closed => Ok(()),
            State::HalfOpen => Ok(()),
            State::Open => {
                let opened_at = inner.opened_at.expect("open state always has opened_at");
                if opened_at.elapsed() >= OPEN_DURATION {
                    inner.state = State::HalfOpen;
                    Ok(())
                } else {
                    Err(EmbeddingError::CircuitOpen)
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        inner.push_sample(true);
        inner.state = State::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("circuit breaker lock poisoned");
        inner.push_sample(false);

        if inner.state == State::HalfOpen {
            inner.trip();
            return;
        }

        let failures = inner.samples.iter().filter(|s| !s.success).count();
        let total = inner.samples.len();
        if total >= MIN_SAMPLES && (failures as f64 / total as f64) >= FAILURE_RATE_THRESHOLD {
            inner.trip();
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn push_sample(&mut self, success: bool) {
        let now = Instant::now();
        self.samples.push_back(Sample { at: now, success });
        while let Some(front) = self.samples.front() {
            if now.duration_since(front.at) > WINDOW {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn trip(&mut self) {
        self.state = State::Open;
        self.opened_at = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stays_closed_below_minimum_sample_count() {
        let breaker = CircuitBreaker::new();
        for _ in 0..4 {
            breaker.record_failure();
        }
        assert!(breaker.check().is_ok());
    }

    #[test]
    fn opens_once_failure_rate_crosses_threshold_with_enough_samples() {
        let breaker = CircuitBreaker::new();
        for _ in 0..5 {
            breaker.record_failure();
        }
        assert!(matches!(breaker.check(), Err(EmbeddingError::CircuitOpen)));
    }

    #[test]
    fn success_resets_the_window() {
        let breaker = CircuitBreaker::new();
        for _ in 0..4 {
            breaker.record_failure();
        }
        breaker.record_success();
        assert!(breaker.check().is_ok());
    }
}
