//! Client-side rate-limit tracking.
//!
//! Once a provider reports a rate limit it is skipped until the reset time.
//! Expiry is lazy: `is_limited` compares against the clock on every read.

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::clock::SharedClock;

/// Reset window used when the provider gives no hint.
pub const DEFAULT_RESET: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct RateLimiter {
    clock: SharedClock,
    default_reset: Duration,
    limited_until: Option<DateTime<Utc>>,
}

impl RateLimiter {
    #[must_use]
    pub const fn new(default_reset: Duration, clock: SharedClock) -> Self {
        Self {
            clock,
            default_reset,
            limited_until: None,
        }
    }

    /// Mark the provider limited until `reset_at`, or for the default window.
    ///
    /// Returns the effective reset time.
    pub fn mark_limited(&mut self, reset_at: Option<DateTime<Utc>>) -> DateTime<Utc> {
        let now = self.clock.now();
        let until = reset_at.unwrap_or_else(|| {
            now + chrono::Duration::from_std(self.default_reset)
                .unwrap_or_else(|_| chrono::Duration::seconds(60))
        });
        self.limited_until = Some(until);
        until
    }

    #[must_use]
    pub fn is_limited(&self) -> bool {
        self.limited_until
            .is_some_and(|until| self.clock.now() < until)
    }

    /// The reset time, only while it is still in the future.
    #[must_use]
    pub fn reset_time(&self) -> Option<DateTime<Utc>> {
        self.limited_until
            .filter(|until| self.clock.now() < *until)
    }
}

/// Earliest future reset among a set of limiters.
pub fn earliest_reset<'a>(limiters: impl IntoIterator<Item = &'a RateLimiter>) -> Option<DateTime<Utc>> {
    limiters.into_iter().filter_map(RateLimiter::reset_time).min()
}
