//! Provider selection and per-provider orchestration state.
//!
//! The manager owns the configured providers together with their circuit
//! breaker, rate limiter and health monitor. All state lives behind one
//! `parking_lot::Mutex`; the lock is never held across an `.await` and
//! events are emitted only after it is released.
//!
//! The manager never sends prompts itself; the conductor does, and reports
//! outcomes back through `record_success` / `record_failure` /
//! `mark_rate_limited`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use super::circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitState, CircuitTransition};
use super::classifier::ErrorCategory;
use super::clock::SharedClock;
use super::events::{EventBus, RelayEvent};
use super::executor::CommandExecutor;
use super::health::{HealthMonitor, HealthSettings, HealthSnapshot};
use super::models::ProviderKind;
use super::rate_limiter::{self, RateLimiter};
use crate::error::{ProviderAttempt, RelayError, Result};
use crate::providers::{Provider, ProviderRegistry, ProviderSettings};
use crate::storage::config::Config;

// =============================================================================
// Settings
// =============================================================================

/// Manager-wide settings.
#[derive(Debug, Clone, Default)]
pub struct ManagerSettings {
    /// Tried first when the caller does not ask for a provider.
    pub default_provider: Option<String>,
    /// Explicit fallback order, ahead of priority order.
    pub fallback_providers: Vec<String>,
    /// Rate-limit window used when a provider gives no reset hint.
    pub rate_limit_reset: Duration,
    pub health: HealthSettings,
}

impl ManagerSettings {
    #[must_use]
    pub fn new() -> Self {
        Self {
            rate_limit_reset: rate_limiter::DEFAULT_RESET,
            ..Self::default()
        }
    }
}

// =============================================================================
// Availability
// =============================================================================

/// Why a provider can or cannot take a request right now.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Availability {
    Ready,
    CircuitOpen,
    RateLimited { until: DateTime<Utc> },
    Unhealthy { score: f64 },
}

impl Availability {
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    /// Short human description.
    #[must_use]
    pub fn reason(&self) -> String {
        match self {
            Self::Ready => "ready".to_string(),
            Self::CircuitOpen => "circuit open".to_string(),
            Self::RateLimited { until } => {
                format!("rate limited until {}", until.format("%H:%M:%S UTC"))
            }
            Self::Unhealthy { score } => format!("unhealthy (score {score:.0})"),
        }
    }
}

/// Serializable per-provider status for display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderStatus {
    pub name: String,
    pub adapter: String,
    pub binary: String,
    pub priority: i32,
    pub kind: ProviderKind,
    pub availability: Availability,
    pub circuit: BreakerSnapshot,
    pub health: HealthSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limited_until: Option<DateTime<Utc>>,
}

// =============================================================================
// State
// =============================================================================

#[derive(Debug)]
struct ProviderState {
    breaker: CircuitBreaker,
    limiter: RateLimiter,
    health: HealthMonitor,
}

impl ProviderState {
    /// Availability after applying any due lazy breaker transition.
    fn evaluate(&mut self) -> (Availability, Option<CircuitTransition>) {
        let transition = self.breaker.refresh();
        let availability = if self.breaker.is_open() {
            Availability::CircuitOpen
        } else if let Some(until) = self.limiter.reset_time() {
            Availability::RateLimited { until }
        } else if !self.health.is_healthy() {
            Availability::Unhealthy {
                score: self.health.score(),
            }
        } else {
            Availability::Ready
        };
        (availability, transition)
    }
}

#[derive(Debug, Default)]
struct ManagerState {
    providers: HashMap<String, ProviderState>,
    current: Option<String>,
}

#[derive(Debug)]
struct Entry {
    settings: ProviderSettings,
    provider: Arc<dyn Provider>,
}

// =============================================================================
// Manager
// =============================================================================

#[derive(Debug)]
pub struct ProviderManager {
    settings: ManagerSettings,
    /// Enabled providers, sorted by priority then name.
    entries: Vec<Entry>,
    clock: SharedClock,
    events: EventBus,
    state: Mutex<ManagerState>,
}

impl ProviderManager {
    /// Build a manager from already constructed providers.
    ///
    /// Disabled providers are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `default_provider` does not name an
    /// enabled provider.
    pub fn new(
        settings: ManagerSettings,
        providers: Vec<(ProviderSettings, Arc<dyn Provider>)>,
        clock: SharedClock,
        events: EventBus,
    ) -> Result<Self> {
        let mut entries: Vec<Entry> = providers
            .into_iter()
            .filter(|(s, _)| s.enabled)
            .map(|(settings, provider)| Entry { settings, provider })
            .collect();
        entries.sort_by(|a, b| {
            a.settings
                .priority
                .cmp(&b.settings.priority)
                .then_with(|| a.settings.name.cmp(&b.settings.name))
        });

        if let Some(default) = &settings.default_provider
            && !entries.iter().any(|e| &e.settings.name == default)
        {
            return Err(RelayError::Config(format!(
                "default_provider '{default}' is not an enabled provider"
            )));
        }

        let providers = entries
            .iter()
            .map(|e| {
                (
                    e.settings.name.clone(),
                    ProviderState {
                        breaker: CircuitBreaker::new(e.settings.circuit_breaker, clock.clone()),
                        limiter: RateLimiter::new(settings.rate_limit_reset, clock.clone()),
                        health: HealthMonitor::new(settings.health, clock.clone()),
                    },
                )
            })
            .collect();

        tracing::debug!(
            providers = ?entries.iter().map(|e| e.settings.name.as_str()).collect::<Vec<_>>(),
            default = settings.default_provider.as_deref().unwrap_or("-"),
            "Provider manager ready"
        );

        Ok(Self {
            settings,
            entries,
            clock,
            events,
            state: Mutex::new(ManagerState {
                providers,
                current: None,
            }),
        })
    }

    /// Build providers from config through the adapter registry.
    ///
    /// # Errors
    ///
    /// Returns configuration errors for invalid settings or unknown adapters.
    pub fn from_config(
        config: &Config,
        registry: &ProviderRegistry,
        executor: Arc<dyn CommandExecutor>,
        clock: SharedClock,
        events: EventBus,
    ) -> Result<Self> {
        let mut providers = Vec::new();
        for settings in config.provider_settings()? {
            if !settings.enabled {
                continue;
            }
            let provider = registry.build(settings.clone(), executor.clone())?;
            providers.push((settings, provider));
        }
        Self::new(config.manager_settings(), providers, clock, events)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    #[must_use]
    pub const fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Provider names in priority order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.settings.name.as_str()).collect()
    }

    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.entry(name).map(|e| e.provider.clone())
    }

    #[must_use]
    pub fn provider_settings(&self, name: &str) -> Option<&ProviderSettings> {
        self.entry(name).map(|e| &e.settings)
    }

    /// Provider most recently selected or switched to.
    #[must_use]
    pub fn current_provider(&self) -> Option<String> {
        self.state.lock().current.clone()
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        self.entries.iter().find(|e| e.settings.name == name)
    }

    /// Candidate order: `first`, then the fallback list, then priority order.
    fn candidate_order<'a>(&'a self, first: Option<&'a str>) -> Vec<&'a str> {
        let mut order: Vec<&str> = Vec::with_capacity(self.entries.len());
        let explicit = first
            .into_iter()
            .chain(self.settings.fallback_providers.iter().map(String::as_str));
        let by_priority = self.entries.iter().map(|e| e.settings.name.as_str());
        for name in explicit.chain(by_priority) {
            if self.entry(name).is_some() && !order.contains(&name) {
                order.push(name);
            }
        }
        order
    }

    /// Run `f` under the lock, then emit any circuit transitions it produced.
    fn with_state<T>(
        &self,
        f: impl FnOnce(&mut ManagerState, &mut Vec<RelayEvent>) -> T,
    ) -> T {
        let mut events = Vec::new();
        let result = {
            let mut state = self.state.lock();
            f(&mut state, &mut events)
        };
        self.events.emit_all(events);
        result
    }

    fn transition_event(
        &self,
        provider: &str,
        transition: Option<CircuitTransition>,
    ) -> Option<RelayEvent> {
        transition.map(|t| RelayEvent::CircuitStateChanged {
            provider: provider.to_string(),
            from: t.from,
            to: t.to,
            timestamp: self.clock.now(),
        })
    }

    /// Availability of every candidate in `order`, evaluated under one lock.
    fn evaluate_all(&self, order: &[&str]) -> Vec<(String, Availability)> {
        self.with_state(|state, events| {
            order
                .iter()
                .filter_map(|name| {
                    let ps = state.providers.get_mut(*name)?;
                    let (availability, transition) = ps.evaluate();
                    events.extend(self.transition_event(name, transition));
                    Some(((*name).to_string(), availability))
                })
                .collect()
        })
    }

    // -------------------------------------------------------------------------
    // Selection
    // -------------------------------------------------------------------------

    /// Pick the provider for a new request.
    ///
    /// With a preferred name, that provider is used if available; otherwise
    /// the default provider, fallback list and priority order are walked.
    ///
    /// # Errors
    ///
    /// [`RelayError::InvalidProvider`] for an unknown preferred name,
    /// [`RelayError::CircuitOpen`] when the only candidate's circuit is open,
    /// [`RelayError::NoProvidersAvailable`] when every candidate is circuit
    /// open, rate limited or unhealthy.
    pub fn select_provider(&self, preferred: Option<&str>) -> Result<Arc<dyn Provider>> {
        if let Some(name) = preferred
            && self.entry(name).is_none()
        {
            return Err(RelayError::InvalidProvider(name.to_string()));
        }

        let first = preferred
            .or(self.settings.default_provider.as_deref())
            .or_else(|| self.entries.first().map(|e| e.settings.name.as_str()));
        let order = self.candidate_order(first);
        let evaluated = self.evaluate_all(&order);

        if let Some((name, _)) = evaluated.iter().find(|(_, a)| a.is_ready()) {
            if let Some(wanted) = preferred
                && wanted != name
            {
                tracing::warn!(
                    requested = wanted,
                    selected = %name,
                    "Requested provider unavailable, using fallback"
                );
            }
            self.state.lock().current = Some(name.clone());
            tracing::debug!(provider = %name, "Selected provider");
            return self
                .provider(name)
                .ok_or_else(|| RelayError::InvalidProvider(name.clone()));
        }

        if let [(name, Availability::CircuitOpen)] = evaluated.as_slice() {
            return Err(RelayError::CircuitOpen {
                provider: name.clone(),
            });
        }

        Err(RelayError::NoProvidersAvailable {
            attempts: evaluated
                .into_iter()
                .map(|(name, a)| ProviderAttempt::new(name, None, a.reason()))
                .collect(),
            earliest_reset: self.earliest_reset(),
        })
    }

    /// Available providers to fall back to, in order, excluding `excluding`.
    #[must_use]
    pub fn fallback_chain(&self, excluding: &[&str]) -> Vec<String> {
        let order: Vec<&str> = self
            .candidate_order(None)
            .into_iter()
            .filter(|name| !excluding.contains(name))
            .collect();
        self.evaluate_all(&order)
            .into_iter()
            .filter(|(_, a)| a.is_ready())
            .map(|(name, _)| name)
            .collect()
    }

    /// First available fallback, excluding `excluding`.
    #[must_use]
    pub fn select_fallback(&self, excluding: &[&str]) -> Option<Arc<dyn Provider>> {
        self.fallback_chain(excluding)
            .first()
            .and_then(|name| self.provider(name))
    }

    /// Move off `from` to the next available provider and emit
    /// [`RelayEvent::ProviderSwitched`].
    ///
    /// `excluding` lists providers that must not be chosen in addition to
    /// `from` (typically those already given up on for this request).
    pub fn switch_provider(
        &self,
        from: &str,
        reason: &str,
        excluding: &[&str],
    ) -> Option<Arc<dyn Provider>> {
        let mut skip: Vec<&str> = excluding.to_vec();
        skip.push(from);
        let next = self.select_fallback(&skip)?;

        self.state.lock().current = Some(next.name().to_string());
        tracing::info!(from, to = next.name(), reason, "Switching provider");
        self.events.emit(&RelayEvent::ProviderSwitched {
            from: from.to_string(),
            to: next.name().to_string(),
            reason: reason.to_string(),
            timestamp: self.clock.now(),
        });
        Some(next)
    }

    // -------------------------------------------------------------------------
    // Outcome recording
    // -------------------------------------------------------------------------

    pub fn record_success(&self, name: &str, duration: Duration) {
        self.with_state(|state, events| {
            if let Some(ps) = state.providers.get_mut(name) {
                // The open timeout may have elapsed while the call was in flight.
                let due = ps.breaker.refresh();
                events.extend(self.transition_event(name, due));
                let transition = ps.breaker.record_success();
                ps.health.record_success(duration);
                events.extend(self.transition_event(name, transition));
            }
        });
    }

    /// Record a classified failure. Returns whether the circuit is now open.
    pub fn record_failure(&self, name: &str, category: ErrorCategory) -> bool {
        self.with_state(|state, events| {
            let Some(ps) = state.providers.get_mut(name) else {
                return false;
            };
            let due = ps.breaker.refresh();
            events.extend(self.transition_event(name, due));
            let transition = ps.breaker.record_failure();
            ps.health.record_failure(category);
            if let Some(t) = transition
                && t.to == CircuitState::Open
            {
                tracing::warn!(
                    provider = name,
                    failures = ps.breaker.failure_count(),
                    "Circuit opened"
                );
            }
            events.extend(self.transition_event(name, transition));
            ps.breaker.is_open()
        })
    }

    /// Mark a provider rate limited until `reset_at` (or the default window).
    ///
    /// Returns the effective reset time.
    pub fn mark_rate_limited(
        &self,
        name: &str,
        reset_at: Option<DateTime<Utc>>,
    ) -> Option<DateTime<Utc>> {
        let until = self.with_state(|state, _| {
            state
                .providers
                .get_mut(name)
                .map(|ps| ps.limiter.mark_limited(reset_at))
        })?;
        tracing::info!(provider = name, reset_at = %until, "Rate limit applied");
        self.events.emit(&RelayEvent::RateLimitApplied {
            provider: name.to_string(),
            reset_at: until,
            timestamp: self.clock.now(),
        });
        Some(until)
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn availability(&self, name: &str) -> Option<Availability> {
        self.evaluate_all(&[name]).pop().map(|(_, a)| a)
    }

    #[must_use]
    pub fn circuit_state(&self, name: &str) -> Option<CircuitState> {
        self.with_state(|state, events| {
            let ps = state.providers.get_mut(name)?;
            let transition = ps.breaker.refresh();
            events.extend(self.transition_event(name, transition));
            Some(ps.breaker.state())
        })
    }

    #[must_use]
    pub fn is_rate_limited(&self, name: &str) -> bool {
        self.state
            .lock()
            .providers
            .get(name)
            .is_some_and(|ps| ps.limiter.is_limited())
    }

    /// Earliest future reset among rate-limited providers.
    #[must_use]
    pub fn earliest_reset(&self) -> Option<DateTime<Utc>> {
        let state = self.state.lock();
        rate_limiter::earliest_reset(state.providers.values().map(|ps| &ps.limiter))
    }

    /// Snapshot of every provider, in priority order.
    #[must_use]
    pub fn statuses(&self) -> Vec<ProviderStatus> {
        self.with_state(|state, events| {
            self.entries
                .iter()
                .filter_map(|entry| {
                    let name = entry.settings.name.as_str();
                    let ps = state.providers.get_mut(name)?;
                    let (availability, transition) = ps.evaluate();
                    events.extend(self.transition_event(name, transition));
                    Some(ProviderStatus {
                        name: name.to_string(),
                        adapter: entry.settings.adapter.clone(),
                        binary: entry.provider.binary().to_string(),
                        priority: entry.settings.priority,
                        kind: entry.settings.kind,
                        availability,
                        circuit: ps.breaker.snapshot(),
                        health: ps.health.snapshot(),
                        rate_limited_until: ps.limiter.reset_time(),
                    })
                })
                .collect()
        })
    }
}
