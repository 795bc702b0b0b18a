//! End-to-end failover scenarios through the conductor, using scripted
//! providers in place of real agent CLIs.

mod common;

use std::sync::Arc;
use std::time::Duration;

use relay::core::classifier::{ErrorCategory, PatternTable};
use relay::core::clock::Clock;
use relay::core::conductor::Conductor;
use relay::core::events::{EventBus, RelayEvent};
use relay::core::models::SendOptions;
use relay::core::provider_manager::ManagerSettings;
use relay::error::RelayError;
use relay::test_utils::{ScriptedProvider, Step, fast_retry, make_test_manager};
use tokio_util::sync::CancellationToken;

use common::log_capture::LogCapture;
use common::{event_kinds, recording_bus};

fn scripted(providers: Vec<ScriptedProvider>) -> Vec<Arc<ScriptedProvider>> {
    providers.into_iter().map(Arc::new).collect()
}

fn conductor_over(
    providers: &[Arc<ScriptedProvider>],
    settings: ManagerSettings,
    events: EventBus,
) -> Conductor {
    let (manager, _clock) = make_test_manager(settings, providers, events);
    Conductor::new(manager, fast_retry())
}

#[tokio::test]
async fn rate_limited_provider_hands_prompt_to_next() {
    let providers = scripted(vec![
        ScriptedProvider::new("cursor").then_fail("Rate limit exceeded, try again in 90 seconds"),
        ScriptedProvider::new("claude").then_reply("patched the parser"),
    ]);
    let (bus, events) = recording_bus();
    let (manager, clock) = make_test_manager(ManagerSettings::new(), &providers, bus);
    let conductor = Conductor::new(manager.clone(), fast_retry());

    let response = conductor
        .send_message("fix the parser bug", None, SendOptions::default())
        .await
        .unwrap();

    assert_eq!(response.provider, "claude");
    assert_eq!(response.output, "patched the parser");
    assert_eq!(providers[0].prompts(), vec!["fix the parser bug"]);
    assert_eq!(providers[1].prompts(), vec!["fix the parser bug"]);

    assert!(manager.is_rate_limited("cursor"));
    assert_eq!(
        manager.earliest_reset(),
        Some(clock.now() + chrono::Duration::seconds(90))
    );

    let kinds = event_kinds(&events);
    assert!(kinds.contains(&"rate_limit_applied"), "{kinds:?}");
    assert!(kinds.contains(&"provider_switched"), "{kinds:?}");
    assert_eq!(kinds.last(), Some(&"token_usage"));
}

#[tokio::test]
async fn single_provider_transient_failures_exhaust_budget() {
    let patterns =
        PatternTable::from_patterns(&[(ErrorCategory::Transient, &["resource_exhausted"])])
            .unwrap();
    let providers = scripted(vec![
        ScriptedProvider::new("cursor")
            .with_patterns(patterns)
            .always_fail("grpc: resource_exhausted"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());
    assert_eq!(conductor.max_attempts(), 2);

    let err = conductor
        .send_message("hello", None, SendOptions::default())
        .await
        .unwrap_err();

    match &err {
        RelayError::NoProvidersAvailable { attempts, .. } => {
            assert_eq!(attempts.len(), 2);
            assert!(
                attempts
                    .iter()
                    .all(|a| a.category == Some(ErrorCategory::Transient))
            );
        }
        other => panic!("expected NoProvidersAvailable, got {other:?}"),
    }
    assert_eq!(err.attempted_providers(), vec!["cursor"]);
    assert_eq!(providers[0].call_count(), 2);
}

#[tokio::test]
async fn transient_failure_retries_same_provider() {
    let capture = LogCapture::start();
    let providers = scripted(vec![
        ScriptedProvider::new("claude")
            .then_fail("upstream returned 503")
            .then_reply("done"),
        ScriptedProvider::new("codex"),
    ]);
    let (bus, events) = recording_bus();
    let conductor = conductor_over(&providers, ManagerSettings::new(), bus);

    let response = conductor
        .send_message("summarize", None, SendOptions::default())
        .await
        .unwrap();

    assert_eq!(response.provider, "claude");
    assert_eq!(providers[0].call_count(), 2);
    assert_eq!(providers[1].call_count(), 0);
    assert!(!event_kinds(&events).contains(&"provider_switched"));

    capture.assert_logged_at(tracing::Level::INFO, "Backing off before retry");
    let recovered = capture.find("Recovered after failures");
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].field("recovered_failures"), Some("1"));
}

#[tokio::test]
async fn explicit_fallback_list_is_followed() {
    let providers = scripted(vec![
        ScriptedProvider::new("claude").then_fail("401 Unauthorized"),
        ScriptedProvider::new("codex"),
        ScriptedProvider::new("gemini").then_reply("from gemini"),
    ]);
    let settings = ManagerSettings {
        fallback_providers: vec!["gemini".to_string()],
        ..ManagerSettings::new()
    };
    let (bus, events) = recording_bus();
    let conductor = conductor_over(&providers, settings, bus);

    let response = conductor
        .send_message("hi", None, SendOptions::default())
        .await
        .unwrap();

    assert_eq!(response.provider, "gemini");
    assert_eq!(providers[1].call_count(), 0);
    let switched = events.lock().iter().find_map(|e| match e {
        RelayEvent::ProviderSwitched { from, to, reason, .. } => {
            Some((from.clone(), to.clone(), reason.clone()))
        }
        _ => None,
    });
    assert_eq!(
        switched,
        Some(("claude".to_string(), "gemini".to_string(), "auth_expired".to_string()))
    );
}

#[tokio::test]
async fn permanent_errors_escalate_without_failover() {
    let providers = scripted(vec![
        ScriptedProvider::new("claude").then_fail("invalid request: malformed tool schema"),
        ScriptedProvider::new("codex"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let err = conductor
        .send_message("hi", None, SendOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        RelayError::Provider {
            category: ErrorCategory::Permanent,
            ..
        }
    ));
    assert_eq!(providers[1].call_count(), 0);
}

#[tokio::test]
async fn escalation_after_failover_keeps_attempt_history() {
    let providers = scripted(vec![
        ScriptedProvider::new("cursor").then_fail("Rate limit exceeded"),
        ScriptedProvider::new("claude").then_fail("invalid request: malformed tool schema"),
        ScriptedProvider::new("codex"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let err = conductor
        .send_message("hi", None, SendOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "RELAY-O004");
    assert_eq!(err.attempted_providers(), vec!["cursor", "claude"]);
    let categories: Vec<_> = err.attempts().iter().map(|a| a.category).collect();
    assert_eq!(
        categories,
        vec![
            Some(ErrorCategory::RateLimited),
            Some(ErrorCategory::Permanent)
        ]
    );
    let RelayError::Escalated { cause, .. } = &err else {
        panic!("expected Escalated, got {err:?}");
    };
    assert!(matches!(
        **cause,
        RelayError::Provider {
            category: ErrorCategory::Permanent,
            ..
        }
    ));
    assert_eq!(providers[2].call_count(), 0);
}

#[tokio::test]
async fn missing_binary_switches_provider() {
    let providers = scripted(vec![
        ScriptedProvider::new("claude").then(Step::NotFound),
        ScriptedProvider::new("codex").then_reply("codex here"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let response = conductor
        .send_message("hi", None, SendOptions::default())
        .await
        .unwrap();
    assert_eq!(response.provider, "codex");
}

#[tokio::test]
async fn model_applies_to_first_provider_only() {
    let providers = scripted(vec![
        ScriptedProvider::new("claude").then_fail("429 Too Many Requests"),
        ScriptedProvider::new("codex"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let options = SendOptions {
        model: Some("opus".to_string()),
        ..SendOptions::default()
    };
    let response = conductor.send_message("hi", None, options).await.unwrap();

    assert_eq!(providers[0].models(), vec![Some("opus".to_string())]);
    assert_eq!(providers[1].models(), vec![None]);
    assert_eq!(response.model, None);
}

#[tokio::test]
async fn preferred_provider_goes_first() {
    let providers = scripted(vec![
        ScriptedProvider::new("claude"),
        ScriptedProvider::new("codex").then_reply("picked"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let response = conductor
        .send_message("hi", Some("codex"), SendOptions::default())
        .await
        .unwrap();
    assert_eq!(response.output, "picked");
    assert_eq!(providers[0].call_count(), 0);
}

#[tokio::test]
async fn unknown_preferred_provider_is_rejected() {
    let providers = scripted(vec![ScriptedProvider::new("claude")]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let err = conductor
        .send_message("hi", Some("bard"), SendOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::InvalidProvider(ref name) if name == "bard"));
    assert_eq!(providers[0].call_count(), 0);
}

#[tokio::test]
async fn attempt_budget_caps_failover() {
    let providers = scripted(vec![
        ScriptedProvider::new("a").always_fail("rate limit"),
        ScriptedProvider::new("b").always_fail("rate limit"),
        ScriptedProvider::new("c"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new())
        .with_max_attempts(2);

    let err = conductor
        .send_message("hi", None, SendOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.attempted_providers(), vec!["a", "b"]);
    assert_eq!(providers[2].call_count(), 0);
    // Both providers are now limited; the earliest reset is reported.
    assert!(matches!(
        err,
        RelayError::NoProvidersAvailable {
            earliest_reset: Some(_),
            ..
        }
    ));
}

#[tokio::test]
async fn every_provider_limited_reports_each_attempt() {
    let providers = scripted(vec![
        ScriptedProvider::new("a").always_fail("rate limit"),
        ScriptedProvider::new("b").always_fail("monthly quota reached"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let err = conductor
        .send_message("hi", None, SendOptions::default())
        .await
        .unwrap_err();

    let RelayError::NoProvidersAvailable { attempts, .. } = err else {
        panic!("expected NoProvidersAvailable");
    };
    let categories: Vec<_> = attempts.iter().map(|a| a.category).collect();
    assert_eq!(
        categories,
        vec![
            Some(ErrorCategory::RateLimited),
            Some(ErrorCategory::QuotaExceeded)
        ]
    );
}

#[tokio::test]
async fn cancellation_stops_in_flight_request() {
    let providers = scripted(vec![
        ScriptedProvider::new("claude").always(Step::Hang),
        ScriptedProvider::new("codex"),
    ]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let options = SendOptions {
        cancel,
        ..SendOptions::default()
    };
    let err = conductor.send_message("hi", None, options).await.unwrap_err();

    assert!(matches!(err, RelayError::Cancelled));
    assert_eq!(providers[1].call_count(), 0);
}

#[tokio::test]
async fn cancelled_before_start_sends_nothing() {
    let providers = scripted(vec![ScriptedProvider::new("claude")]);
    let conductor = conductor_over(&providers, ManagerSettings::new(), EventBus::new());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let options = SendOptions {
        cancel,
        ..SendOptions::default()
    };
    let err = conductor.send_message("hi", None, options).await.unwrap_err();

    assert!(matches!(err, RelayError::Cancelled));
    assert_eq!(providers[0].call_count(), 0);
}
