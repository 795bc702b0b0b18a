//! Rolling health score for a provider.
//!
//! The score is recomputed on read from a bounded window of recent outcomes:
//!
//! | weight | component                                           |
//! |--------|-----------------------------------------------------|
//! | 50     | success rate over the window                        |
//! | 30     | successes / (successes + rate limits), 1 if neither |
//! | 20     | 1 - min(mean success latency / slow threshold, 1)   |
//!
//! An empty window scores 100. Recording a failure never raises the score;
//! a success raises the first two components but a very slow one can still
//! lower the latency component.
//!
//! Outcomes older than `max_age` drop out of the window, so a provider that
//! was excluded as unhealthy becomes eligible again once its failures age out.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::classifier::ErrorCategory;
use super::clock::SharedClock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSettings {
    /// A provider is healthy while its score is strictly above this.
    pub threshold: f64,
    /// Number of recent outcomes kept.
    pub window: usize,
    /// Below this many samples the provider is always considered healthy.
    pub min_samples: usize,
    /// Mean latency at which the latency component reaches zero.
    pub slow_response: Duration,
    /// Outcomes older than this are ignored.
    pub max_age: Duration,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            threshold: 50.0,
            window: 20,
            min_samples: 5,
            slow_response: Duration::from_secs(120),
            max_age: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Success(Duration),
    RateLimited,
    Failure,
}

/// Lifetime counters plus the current score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub score: f64,
    pub healthy: bool,
    pub successes: u64,
    pub failures: u64,
}

#[derive(Debug, Clone)]
pub struct HealthMonitor {
    settings: HealthSettings,
    clock: SharedClock,
    recent: VecDeque<(DateTime<Utc>, Outcome)>,
    total_successes: u64,
    total_failures: u64,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(settings: HealthSettings, clock: SharedClock) -> Self {
        Self {
            recent: VecDeque::with_capacity(settings.window.max(1)),
            settings,
            clock,
            total_successes: 0,
            total_failures: 0,
        }
    }

    pub fn record_success(&mut self, duration: Duration) {
        self.total_successes += 1;
        self.push(Outcome::Success(duration));
    }

    pub fn record_failure(&mut self, category: ErrorCategory) {
        self.total_failures += 1;
        self.push(if category == ErrorCategory::RateLimited {
            Outcome::RateLimited
        } else {
            Outcome::Failure
        });
    }

    fn push(&mut self, outcome: Outcome) {
        if self.recent.len() >= self.settings.window.max(1) {
            self.recent.pop_front();
        }
        self.recent.push_back((self.clock.now(), outcome));
    }

    fn fresh(&self) -> impl Iterator<Item = &Outcome> {
        let now = self.clock.now();
        let max_age = chrono::Duration::from_std(self.settings.max_age)
            .unwrap_or(chrono::Duration::MAX);
        self.recent
            .iter()
            .filter(move |(at, _)| now.signed_duration_since(*at) <= max_age)
            .map(|(_, outcome)| outcome)
    }

    /// Number of outcomes currently inside the window.
    #[must_use]
    pub fn samples(&self) -> usize {
        self.fresh().count()
    }

    /// Health score in `[0, 100]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self) -> f64 {
        let mut total = 0_usize;
        let mut successes = 0_usize;
        let mut rate_limited = 0_usize;
        let mut latency = Duration::ZERO;
        for outcome in self.fresh() {
            total += 1;
            match outcome {
                Outcome::Success(d) => {
                    successes += 1;
                    latency += *d;
                }
                Outcome::RateLimited => rate_limited += 1,
                Outcome::Failure => {}
            }
        }
        if total == 0 {
            return 100.0;
        }

        let success_rate = successes as f64 / total as f64;
        let limit_ratio = if successes + rate_limited == 0 {
            1.0
        } else {
            successes as f64 / (successes + rate_limited) as f64
        };
        let speed = if successes == 0 || self.settings.slow_response.is_zero() {
            1.0
        } else {
            let mean = latency.as_secs_f64() / successes as f64;
            1.0 - (mean / self.settings.slow_response.as_secs_f64()).min(1.0)
        };

        (50.0 * success_rate + 30.0 * limit_ratio + 20.0 * speed).clamp(0.0, 100.0)
    }

    /// Healthy until enough samples exist, then `score > threshold`.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.samples() < self.settings.min_samples || self.score() > self.settings.threshold
    }

    #[must_use]
    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            score: self.score(),
            healthy: self.is_healthy(),
            successes: self.total_successes,
            failures: self.total_failures,
        }
    }
}
