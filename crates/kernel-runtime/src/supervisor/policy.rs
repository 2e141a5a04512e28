//! # Restart policies for worker processes.
//!
//! [`RestartStrategy`] decides what happens after a worker exits:
//!
//! - [`RestartStrategy::Immediate`] relaunch at once, forever (default).
//! - [`RestartStrategy::Backoff`] relaunch after `first × factor^n`, capped
//!   at `max`; `n` resets once a worker stayed up for `reset_after`.
//! - [`RestartStrategy::CircuitBreaker`] relaunch at once, but give up when
//!   more than `max_restarts` restarts fall inside `window`.
//!
//! A clean exit and a crash are treated alike.

use rand::Rng;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Randomization applied to backoff delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
}

impl Jitter {
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            Self::None => delay,
            Self::Full => {
                let ms = delay.as_millis() as u64;
                Duration::from_millis(rand::thread_rng().gen_range(0..=ms))
            }
            Self::Equal => {
                let half = delay.as_millis() as u64 / 2;
                Duration::from_millis(half + rand::thread_rng().gen_range(0..=half))
            }
        }
    }
}

/// Exponential delay between restarts of one slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub first: Duration,
    pub max: Duration,
    pub factor: f64,
    pub jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: Jitter::None,
        }
    }
}

impl BackoffPolicy {
    /// Delay before restart number `attempt` (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}

/// What to do when a worker exits.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RestartStrategy {
    #[default]
    Immediate,
    Backoff {
        policy: BackoffPolicy,
        reset_after: Duration,
    },
    CircuitBreaker {
        max_restarts: usize,
        window: Duration,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartDecision {
    Restart { delay: Duration },
    GiveUp { restarts: usize, window: Duration },
}

/// Applies a [`RestartStrategy`] to a stream of exits.
#[derive(Debug)]
pub struct RestartTracker {
    strategy: RestartStrategy,
    attempts: HashMap<usize, u32>,
    recent: VecDeque<Instant>,
}

impl RestartTracker {
    pub fn new(strategy: RestartStrategy) -> Self {
        Self {
            strategy,
            attempts: HashMap::new(),
            recent: VecDeque::new(),
        }
    }

    /// Record that the worker in `slot` exited after `uptime`.
    pub fn on_exit(&mut self, slot: usize, uptime: Duration, now: Instant) -> RestartDecision {
        match &self.strategy {
            RestartStrategy::Immediate => RestartDecision::Restart {
                delay: Duration::ZERO,
            },
            RestartStrategy::Backoff {
                policy,
                reset_after,
            } => {
                let attempt = self.attempts.entry(slot).or_insert(0);
                if uptime >= *reset_after {
                    *attempt = 0;
                }
                let delay = policy.next(*attempt);
                *attempt = attempt.saturating_add(1);
                RestartDecision::Restart { delay }
            }
            RestartStrategy::CircuitBreaker {
                max_restarts,
                window,
            } => {
                self.recent.push_back(now);
                while let Some(oldest) = self.recent.front() {
                    if now.duration_since(*oldest) > *window {
                        self.recent.pop_front();
                    } else {
                        break;
                    }
                }
                if self.recent.len() > *max_restarts {
                    RestartDecision::GiveUp {
                        restarts: self.recent.len(),
                        window: *window,
                    }
                } else {
                    RestartDecision::Restart {
                        delay: Duration::ZERO,
                    }
                }
            }
        }
    }
}
