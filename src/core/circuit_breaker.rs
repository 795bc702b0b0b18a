//! Per-provider circuit breaker.
//!
//! ```text
//!            failure_threshold failures
//!   Closed ─────────────────────────────▶ Open
//!     ▲                                   │  ▲
//!     │ half_open_success_threshold       │  │ any failure
//!     │ consecutive successes   timeout   ▼  │
//!     └──────────────────────────────── HalfOpen
//! ```
//!
//! There is no timer: Open becomes HalfOpen lazily when the state is read
//! after the timeout has elapsed on the injected clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::clock::SharedClock;

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation, requests pass through.
    #[default]
    Closed,
    /// Circuit tripped, requests fail fast.
    Open,
    /// Testing if the provider recovered.
    HalfOpen,
}

impl CircuitState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tunables for one breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitBreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    /// How long the circuit stays open before admitting a trial request.
    pub timeout: Duration,
    pub half_open_success_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            timeout: Duration::from_secs(60),
            half_open_success_threshold: 2,
        }
    }
}

/// A state change, reported so the caller can emit an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CircuitTransition {
    pub from: CircuitState,
    pub to: CircuitState,
}

/// Point-in-time view for status displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Circuit breaker for a single provider.
///
/// When disabled the failure/success counters still move, but the state never
/// leaves `Closed` and [`CircuitBreaker::is_open`] is always false.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: CircuitBreakerSettings,
    clock: SharedClock,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    opened_at: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    #[must_use]
    pub const fn new(settings: CircuitBreakerSettings, clock: SharedClock) -> Self {
        Self {
            settings,
            clock,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            opened_at: None,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &CircuitBreakerSettings {
        &self.settings
    }

    /// Current state after applying any due Open → HalfOpen transition.
    pub fn state(&mut self) -> CircuitState {
        self.refresh();
        self.state
    }

    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failure_count
    }

    #[must_use]
    pub const fn success_count(&self) -> u32 {
        self.success_count
    }

    #[must_use]
    pub const fn opened_at(&self) -> Option<DateTime<Utc>> {
        self.opened_at
    }

    /// Apply the lazy Open → HalfOpen transition if the timeout has elapsed.
    pub fn refresh(&mut self) -> Option<CircuitTransition> {
        if self.state != CircuitState::Open {
            return None;
        }
        let opened_at = self.opened_at?;
        let elapsed = (self.clock.now() - opened_at).to_std().unwrap_or(Duration::ZERO);
        if elapsed >= self.settings.timeout {
            self.success_count = 0;
            Some(self.transition(CircuitState::HalfOpen))
        } else {
            None
        }
    }

    /// Whether requests should be blocked right now.
    pub fn is_open(&mut self) -> bool {
        if !self.settings.enabled {
            return false;
        }
        self.refresh();
        self.state == CircuitState::Open
    }

    /// Record a successful call.
    pub fn record_success(&mut self) -> Option<CircuitTransition> {
        self.refresh();
        match self.state {
            CircuitState::Closed => {
                self.failure_count = 0;
                None
            }
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.settings.half_open_success_threshold {
                    self.failure_count = 0;
                    self.success_count = 0;
                    self.opened_at = None;
                    Some(self.transition(CircuitState::Closed))
                } else {
                    None
                }
            }
            // A call admitted before the circuit opened; it does not close it.
            CircuitState::Open => None,
        }
    }

    /// Record a failed call.
    pub fn record_failure(&mut self) -> Option<CircuitTransition> {
        self.refresh();
        self.failure_count = self.failure_count.saturating_add(1);
        if !self.settings.enabled {
            return None;
        }
        match self.state {
            CircuitState::Closed if self.failure_count >= self.settings.failure_threshold => {
                self.opened_at = Some(self.clock.now());
                Some(self.transition(CircuitState::Open))
            }
            CircuitState::HalfOpen => {
                self.success_count = 0;
                self.opened_at = Some(self.clock.now());
                Some(self.transition(CircuitState::Open))
            }
            CircuitState::Closed | CircuitState::Open => None,
        }
    }

    /// Snapshot for display.
    pub fn snapshot(&mut self) -> BreakerSnapshot {
        self.refresh();
        BreakerSnapshot {
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            opened_at: self.opened_at,
        }
    }

    fn transition(&mut self, to: CircuitState) -> CircuitTransition {
        let from = self.state;
        self.state = to;
        tracing::debug!(from = %from, to = %to, "Circuit breaker transition");
        CircuitTransition { from, to }
    }
}
