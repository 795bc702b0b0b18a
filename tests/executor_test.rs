//! Process execution against real system binaries.

#![cfg(unix)]

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use relay::core::executor::{CommandExecutor, CommandSpec, ExecError, TokioExecutor};
use tokio_util::sync::CancellationToken;

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new("sh").args(["-c", script])
}

#[tokio::test]
async fn captures_stdout_stderr_and_exit_code() {
    let output = TokioExecutor::new()
        .execute(
            &sh("echo answer; echo warning >&2; exit 3"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(output.stdout.trim(), "answer");
    assert_eq!(output.stderr.trim(), "warning");
    assert_eq!(output.exit_code, 3);
    assert!(!output.success());
    assert_eq!(output.failure_text(), "warning");
}

#[tokio::test]
async fn feeds_stdin_and_env() {
    let mut env = BTreeMap::new();
    env.insert("RELAY_TEST_GREETING".to_string(), "hello".to_string());
    let spec = sh(r#"read line; echo "$RELAY_TEST_GREETING $line""#)
        .envs(&env)
        .stdin("world\n");

    let output = TokioExecutor::new()
        .execute(&spec, &CancellationToken::new())
        .await
        .unwrap();

    assert!(output.success());
    assert_eq!(output.stdout.trim(), "hello world");
}

#[tokio::test]
async fn invalid_utf8_output_is_decoded_lossily() {
    let output = TokioExecutor::new()
        .execute(
            &sh(r"printf 'ok \377 done'; printf 'warn \376' >&2"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(output.success());
    assert_eq!(output.stdout, "ok \u{FFFD} done");
    assert_eq!(output.stderr, "warn \u{FFFD}");
}

#[tokio::test]
async fn large_output_does_not_deadlock() {
    let spec = sh("i=0; while [ $i -lt 20000 ]; do echo line-$i; echo err-$i >&2; i=$((i+1)); done");
    let output = TokioExecutor::new()
        .execute(&spec, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(output.stdout.lines().count(), 20_000);
    assert_eq!(output.stderr.lines().count(), 20_000);
}

#[tokio::test]
async fn timeout_kills_the_process() {
    let spec = CommandSpec::new("sleep")
        .arg("30")
        .timeout(Duration::from_millis(200));

    let started = Instant::now();
    let err = TokioExecutor::new()
        .execute(&spec, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Timeout { .. }), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn cancellation_kills_the_process() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = TokioExecutor::new()
        .execute(&CommandSpec::new("sleep").arg("30"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, ExecError::Cancelled(_)), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn which_resolves_system_binaries() {
    let executor = TokioExecutor::new();
    assert!(executor.which("sh").is_some());
    assert!(executor.which("relay-no-such-binary-42").is_none());
}
