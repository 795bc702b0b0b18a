//! Shared helpers for integration tests.
//!
//! - `log_capture`: collect `tracing` output emitted inside a test
//! - `events`: record orchestration events from an `EventBus`

#![allow(dead_code)]

pub mod log_capture;

use std::sync::Arc;

use parking_lot::Mutex;
use relay::core::events::{EventBus, RelayEvent};

/// An event bus whose events are collected for assertions.
pub fn recording_bus() -> (EventBus, Arc<Mutex<Vec<RelayEvent>>>) {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe(move |event: &RelayEvent| sink.lock().push(event.clone()));
    (bus, seen)
}

/// Kinds of the recorded events, in order.
pub fn event_kinds(events: &Mutex<Vec<RelayEvent>>) -> Vec<&'static str> {
    events.lock().iter().map(RelayEvent::kind).collect()
}
