//! End-to-end tests for the `relay` binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use relay::test_utils::{TestDir, make_test_config_toml};

/// The binary with a known config file and no ambient relay settings.
fn relay(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("relay").unwrap();
    cmd.env("RELAY_CONFIG", config)
        .env("NO_COLOR", "1")
        .env_remove("RELAY_PROVIDER")
        .env_remove("RELAY_FORMAT")
        .env_remove("RELAY_TIMEOUT")
        .env_remove("RELAY_MAX_ATTEMPTS")
        .env_remove("RELAY_LOG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    let dir = TestDir::new();
    relay(&dir.path().join("none.toml"))
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("send"))
        .stdout(predicate::str::contains("providers"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn no_command_prints_quickstart() {
    let dir = TestDir::new();
    relay(&dir.path().join("none.toml"))
        .assert()
        .success()
        .stdout(predicate::str::contains("QUICK START"));
}

#[test]
fn config_path_honours_env_override() {
    let dir = TestDir::new();
    let path = dir.path().join("custom.toml");
    relay(&path)
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(path.display().to_string()));
}

#[test]
fn config_default_prints_builtin_providers() {
    let dir = TestDir::new();
    relay(&dir.path().join("none.toml"))
        .args(["config", "--default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[providers.claude]"))
        .stdout(predicate::str::contains("[providers.gemini]"));
}

#[test]
fn malformed_config_exits_with_config_error() {
    let dir = TestDir::new();
    let path = dir.create_file("config.toml", "[general\nbroken = ");
    relay(&path)
        .arg("providers")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("RELAY-C002"));
}

#[test]
fn invalid_config_value_is_reported_as_json() {
    let dir = TestDir::new();
    let path = dir.create_file("config.toml", "[retry]\nbase_delay_ms = 500\nmax_delay_ms = 10\n");
    let output = relay(&path)
        .args(["providers", "--json"])
        .assert()
        .code(3)
        .get_output()
        .stderr
        .clone();
    let stderr = String::from_utf8(output).unwrap();
    let line = stderr
        .lines()
        .find(|l| l.contains("\"error_code\""))
        .unwrap();
    let parsed: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(parsed["error_code"], "RELAY-C003");
    assert_eq!(parsed["exit_code"], 3);
}

#[test]
fn completions_generate_for_bash() {
    let dir = TestDir::new();
    relay(&dir.path().join("none.toml"))
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("relay"));
}

#[test]
fn providers_json_lists_configured_providers() {
    let dir = TestDir::new();
    let path = dir.create_file("config.toml", &make_test_config_toml());
    let output = relay(&path)
        .args(["providers", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed["schemaVersion"], "relay.v1");
    assert_eq!(parsed["command"], "providers");
    let names: Vec<&str> = parsed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|row| row["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["claude", "codex", "work"]);
}

#[test]
fn send_rejects_zero_timeout() {
    let dir = TestDir::new();
    relay(&dir.path().join("none.toml"))
        .args(["send", "--timeout", "0", "hello"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("--timeout"));
}

#[test]
fn send_rejects_unknown_provider() {
    let dir = TestDir::new();
    let path = dir.create_file("config.toml", &make_test_config_toml());
    relay(&path)
        .args(["send", "-p", "bard", "hello"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("RELAY-C010"));
}

// =============================================================================
// Send against stand-in agent CLIs
// =============================================================================

#[cfg(unix)]
fn write_script(dir: &TestDir, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.create_file(name, &format!("#!/bin/sh\n{body}\n"));
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Two codex-style providers: `primary` is rate limited, `backup` echoes.
#[cfg(unix)]
fn failover_config(dir: &TestDir, backup_body: &str) -> PathBuf {
    let limited = write_script(
        dir,
        "limited",
        "echo 'Rate limit exceeded, try again in 120 seconds' >&2\nexit 1",
    );
    let backup = write_script(dir, "backup", backup_body);
    dir.create_file(
        "config.toml",
        &format!(
            r#"[retry]
base_delay_ms = 1
max_delay_ms = 5
jitter = false

[providers.primary]
adapter = "codex"
binary = "{}"
priority = 1

[providers.backup]
adapter = "codex"
binary = "{}"
priority = 2
"#,
            limited.display(),
            backup.display()
        ),
    )
}

#[cfg(unix)]
#[test]
fn send_fails_over_to_backup_provider() {
    let dir = TestDir::new();
    let config = failover_config(&dir, r#"for arg; do last="$arg"; done; echo "backup: $last""#);

    let output = relay(&config)
        .args(["send", "--json", "ship it"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(parsed["command"], "send");
    assert_eq!(parsed["data"]["provider"], "backup");
    assert_eq!(parsed["data"]["output"], "backup: ship it");
}

#[cfg(unix)]
#[test]
fn send_reads_prompt_from_stdin() {
    let dir = TestDir::new();
    let config = failover_config(&dir, r#"for arg; do last="$arg"; done; echo "got $last""#);

    relay(&config)
        .arg("send")
        .write_stdin("piped prompt")
        .assert()
        .success()
        .stdout("got piped prompt\n");
}

#[cfg(unix)]
#[test]
fn send_streams_events_on_stderr() {
    let dir = TestDir::new();
    let config = failover_config(&dir, "echo ok");

    relay(&config)
        .args(["send", "--events", "hi"])
        .assert()
        .success()
        .stderr(predicate::str::contains(r#""event":"rate_limit_applied""#))
        .stderr(predicate::str::contains(r#""event":"provider_switched""#));
}

#[cfg(unix)]
#[test]
fn send_exhaustion_exits_with_no_providers() {
    let dir = TestDir::new();
    let config = failover_config(&dir, "echo '503 Service Unavailable' >&2\nexit 1");

    relay(&config)
        .args(["send", "--max-attempts", "2", "hi"])
        .assert()
        .code(5)
        .stderr(predicate::str::contains("RELAY-O002"))
        .stderr(predicate::str::contains("primary"))
        .stderr(predicate::str::contains("backup"));
}
