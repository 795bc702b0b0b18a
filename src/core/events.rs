//! Orchestration events.
//!
//! The core never persists anything; consumers subscribe an [`EventSink`] to
//! the [`EventBus`] and decide what to keep. Events serialize as tagged JSON
//! so the CLI can stream them line by line.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use super::circuit_breaker::CircuitState;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RelayEvent {
    TokenUsage {
        provider: String,
        model: Option<String>,
        input_tokens: u64,
        output_tokens: u64,
        total_tokens: u64,
        timestamp: DateTime<Utc>,
    },
    ProviderSwitched {
        from: String,
        to: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    CircuitStateChanged {
        provider: String,
        from: CircuitState,
        to: CircuitState,
        timestamp: DateTime<Utc>,
    },
    RateLimitApplied {
        provider: String,
        reset_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
}

impl RelayEvent {
    /// Short snake_case name of the event kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TokenUsage { .. } => "token_usage",
            Self::ProviderSwitched { .. } => "provider_switched",
            Self::CircuitStateChanged { .. } => "circuit_state_changed",
            Self::RateLimitApplied { .. } => "rate_limit_applied",
        }
    }
}

/// Receives orchestration events. Must not block.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: &RelayEvent);
}

impl<F> EventSink for F
where
    F: Fn(&RelayEvent) + Send + Sync,
{
    fn on_event(&self, event: &RelayEvent) {
        self(event);
    }
}

/// Fan-out to every subscribed sink, in subscription order.
#[derive(Default, Clone)]
pub struct EventBus {
    sinks: Arc<RwLock<Vec<Arc<dyn EventSink>>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, sink: impl EventSink + 'static) {
        self.sinks.write().push(Arc::new(sink));
    }

    pub fn emit(&self, event: &RelayEvent) {
        let sinks = self.sinks.read().clone();
        for sink in sinks {
            sink.on_event(event);
        }
    }

    pub fn emit_all(&self, events: impl IntoIterator<Item = RelayEvent>) {
        for event in events {
            self.emit(&event);
        }
    }
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn on_event(&self, event: &RelayEvent) {
        match event {
            RelayEvent::TokenUsage {
                provider,
                model,
                input_tokens,
                output_tokens,
                total_tokens,
                ..
            } => tracing::info!(
                provider = %provider,
                model = model.as_deref().unwrap_or("default"),
                input_tokens,
                output_tokens,
                total_tokens,
                "Token usage"
            ),
            RelayEvent::ProviderSwitched { from, to, reason, .. } => {
                tracing::warn!(from = %from, to = %to, reason = %reason, "Provider switched");
            }
            RelayEvent::CircuitStateChanged { provider, from, to, .. } => {
                tracing::warn!(provider = %provider, from = %from, to = %to, "Circuit state changed");
            }
            RelayEvent::RateLimitApplied { provider, reset_at, .. } => {
                tracing::warn!(provider = %provider, reset_at = %reset_at, "Rate limit applied");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tracing_test::traced_test;

    fn switched() -> RelayEvent {
        RelayEvent::ProviderSwitched {
            from: "cursor".to_string(),
            to: "claude".to_string(),
            reason: "rate_limited".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn bus_fans_out_in_order() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        bus.subscribe(move |e: &RelayEvent| first.lock().push(format!("a:{}", e.kind())));
        let second = seen.clone();
        bus.subscribe(move |e: &RelayEvent| second.lock().push(format!("b:{}", e.kind())));

        bus.emit(&switched());
        assert_eq!(
            *seen.lock(),
            vec!["a:provider_switched", "b:provider_switched"]
        );
    }

    #[test]
    fn events_serialize_tagged() {
        let json = serde_json::to_value(switched()).unwrap();
        assert_eq!(json["event"], "provider_switched");
        assert_eq!(json["from"], "cursor");

        let json = serde_json::to_value(RelayEvent::CircuitStateChanged {
            provider: "claude".to_string(),
            from: CircuitState::Closed,
            to: CircuitState::Open,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert_eq!(json["to"], "open");
    }

    #[test]
    #[traced_test]
    fn tracing_sink_logs() {
        TracingSink.on_event(&switched());
        assert!(logs_contain("Provider switched"));
        assert!(logs_contain("claude"));
    }
}
