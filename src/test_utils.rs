//! Test utilities for relay.
//!
//! Scripted providers and executors that stand in for real agent CLIs,
//! plus small factories shared by unit and integration tests.
//!
//! # Usage
//!
//! ```rust,ignore
//! use relay::test_utils::*;
//!
//! let cursor = ScriptedProvider::new("cursor").then_fail("Rate limit exceeded");
//! let claude = ScriptedProvider::new("claude").then_reply("done");
//! ```

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::circuit_breaker::CircuitBreakerSettings;
use crate::core::classifier::PatternTable;
use crate::core::clock::{ManualClock, SharedClock};
use crate::core::conductor::RetryPolicy;
use crate::core::events::EventBus;
use crate::core::executor::{CommandExecutor, CommandSpec, ExecError, ExecOutput};
use crate::core::models::{Capabilities, Response, SendOptions, TokenUsage};
use crate::core::provider_manager::{ManagerSettings, ProviderManager};
use crate::error::{RelayError, Result, classified_error};
use crate::providers::{Provider, ProviderSettings};

// =============================================================================
// Scripted provider
// =============================================================================

/// One scripted outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Succeed with this output.
    Reply(String),
    /// Fail with this message, classified against the provider's patterns.
    Fail(String),
    /// Fail as if the process exceeded its timeout.
    Timeout,
    /// Fail as if the binary were missing.
    NotFound,
    /// Block until the request is cancelled.
    Hang,
}

/// A [`Provider`] that plays back a script instead of running a process.
///
/// Steps are consumed in order; once the script is empty the `always` step
/// repeats (a reply of `"ok"` unless changed).
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    patterns: PatternTable,
    script: Mutex<VecDeque<Step>>,
    always: Step,
    available: bool,
    calls: Mutex<Vec<(String, Option<String>)>>,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            patterns: PatternTable::empty(),
            script: Mutex::new(VecDeque::new()),
            always: Step::Reply("ok".to_string()),
            available: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn with_patterns(mut self, patterns: PatternTable) -> Self {
        self.patterns = patterns;
        self
    }

    #[must_use]
    pub const fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    #[must_use]
    pub fn then(self, step: Step) -> Self {
        self.script.lock().push_back(step);
        self
    }

    #[must_use]
    pub fn then_reply(self, output: impl Into<String>) -> Self {
        self.then(Step::Reply(output.into()))
    }

    #[must_use]
    pub fn then_fail(self, message: impl Into<String>) -> Self {
        self.then(Step::Fail(message.into()))
    }

    /// Step repeated once the script runs out.
    #[must_use]
    pub fn always(mut self, step: Step) -> Self {
        self.always = step;
        self
    }

    #[must_use]
    pub fn always_fail(self, message: impl Into<String>) -> Self {
        self.always(Step::Fail(message.into()))
    }

    /// Prompts received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Model option of each call, in order.
    #[must_use]
    pub fn models(&self) -> Vec<Option<String>> {
        self.calls.lock().iter().map(|(_, m)| m.clone()).collect()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn binary(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    fn error_patterns(&self) -> &PatternTable {
        &self.patterns
    }

    fn available(&self) -> bool {
        self.available
    }

    async fn send_message(&self, prompt: &str, options: &SendOptions) -> Result<Response> {
        self.calls
            .lock()
            .push((prompt.to_string(), options.model.clone()));
        let step = self
            .script
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.always.clone());

        match step {
            Step::Reply(output) => Ok(Response::new(&self.name, output, Duration::from_millis(5))
                .with_model(options.model.clone())
                .with_usage(Some(TokenUsage::new(10, 5)))),
            Step::Fail(message) => Err(classified_error(
                &self.name,
                &message,
                &self.patterns,
                Some(1),
            )),
            Step::Timeout => Err(RelayError::Timeout {
                provider: self.name.clone(),
                seconds: options.timeout.map_or(300, |t| t.as_secs()),
            }),
            Step::NotFound => Err(RelayError::CliNotFound {
                provider: self.name.clone(),
                binary: self.name.clone(),
            }),
            Step::Hang => {
                options.cancel.cancelled().await;
                Err(RelayError::Cancelled)
            }
        }
    }
}

// =============================================================================
// Recording executor
// =============================================================================

/// A [`CommandExecutor`] that records specs and returns queued outputs.
///
/// With nothing queued it returns a successful, empty output.
#[derive(Debug)]
pub struct RecordingExecutor {
    specs: Mutex<Vec<CommandSpec>>,
    outputs: Mutex<VecDeque<std::result::Result<ExecOutput, ExecError>>>,
    binaries_present: bool,
}

impl Default for RecordingExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingExecutor {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            specs: Mutex::new(Vec::new()),
            outputs: Mutex::new(VecDeque::new()),
            binaries_present: true,
        }
    }

    /// `which` resolves nothing.
    #[must_use]
    pub const fn without_binaries(mut self) -> Self {
        self.binaries_present = false;
        self
    }

    /// Queue a finished process.
    pub fn push_output(&self, stdout: &str, stderr: &str, exit_code: i32) {
        self.outputs.lock().push_back(Ok(ExecOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            duration: Duration::from_millis(20),
        }));
    }

    /// Queue an executor failure.
    pub fn push_error(&self, err: ExecError) {
        self.outputs.lock().push_back(Err(err));
    }

    /// Commands executed so far.
    #[must_use]
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.specs.lock().clone()
    }
}

#[async_trait]
impl CommandExecutor for RecordingExecutor {
    async fn execute(
        &self,
        spec: &CommandSpec,
        cancel: &CancellationToken,
    ) -> std::result::Result<ExecOutput, ExecError> {
        self.specs.lock().push(spec.clone());
        if cancel.is_cancelled() {
            return Err(ExecError::Cancelled(spec.program.clone()));
        }
        self.outputs.lock().pop_front().unwrap_or_else(|| {
            Ok(ExecOutput {
                stdout: String::new(),
                stderr: String::new(),
                exit_code: 0,
                duration: Duration::from_millis(20),
            })
        })
    }

    fn which(&self, binary: &str) -> Option<PathBuf> {
        self.binaries_present
            .then(|| PathBuf::from("/usr/local/bin").join(binary))
    }
}

// =============================================================================
// Factories
// =============================================================================

/// Backoff small enough to keep tests fast.
#[must_use]
pub const fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        exponential_base: 2.0,
        jitter: false,
    }
}

/// Settings for a provider with the given priority and breaker threshold.
#[must_use]
pub fn make_test_settings(name: &str, priority: i32, failure_threshold: u32) -> ProviderSettings {
    ProviderSettings::new(name)
        .with_priority(priority)
        .with_circuit_breaker(CircuitBreakerSettings {
            failure_threshold,
            ..CircuitBreakerSettings::default()
        })
}

/// A manager over scripted providers, driven by a manual clock.
///
/// Providers get priorities in the order given.
///
/// # Panics
///
/// Panics if the manager settings are invalid.
#[must_use]
pub fn make_test_manager(
    settings: ManagerSettings,
    providers: &[Arc<ScriptedProvider>],
    events: EventBus,
) -> (Arc<ProviderManager>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::default());
    let entries = providers
        .iter()
        .zip(1..)
        .map(|(p, priority)| {
            (
                make_test_settings(p.name(), priority, 5),
                p.clone() as Arc<dyn Provider>,
            )
        })
        .collect();
    let shared: SharedClock = clock.clone();
    let manager = ProviderManager::new(settings, entries, shared, events)
        .expect("invalid test manager settings");
    (Arc::new(manager), clock)
}

/// A complete config file exercising every section.
#[must_use]
pub fn make_test_config_toml() -> String {
    r#"[general]
default_provider = "claude"
fallback_providers = ["codex"]
max_attempts = 3
log_level = "debug"

[retry]
base_delay_ms = 10
max_delay_ms = 100
exponential_base = 2.0
jitter = false

[circuit_breaker]
enabled = true
failure_threshold = 3
timeout_seconds = 30
half_open_success_threshold = 2

[rate_limit]
default_reset_seconds = 90

[health]
threshold = 40.0
window = 10
min_samples = 3
slow_response_seconds = 60
max_age_seconds = 300

[providers.claude]
priority = 1
kind = "subscription"
models = ["sonnet", "opus"]
timeout_seconds = 600

[providers.codex]
priority = 2
kind = "usage_based"
default_flags = ["--skip-git-repo-check"]

[providers.codex.circuit_breaker]
failure_threshold = 1

[providers.codex.error_patterns]
transient = ["upstream hiccup"]

[providers.work]
adapter = "anthropic"
binary = "/opt/claude/bin/claude"
priority = 5
enabled = false

[providers.work.env]
CLAUDE_CONFIG_DIR = "/home/me/.claude-work"
"#
    .to_string()
}

// =============================================================================
// Temporary directories
// =============================================================================

/// An isolated temporary directory, removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Write a file, creating parent directories. Returns its path.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, content).expect("Failed to write test file");
        path
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Output helpers
// =============================================================================

/// Remove ANSI escape sequences from colored output.
#[must_use]
pub fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                // Skip until the terminating letter
                while let Some(&next) = chars.peek() {
                    chars.next();
                    if next.is_ascii_alphabetic() {
                        break;
                    }
                }
            }
        } else {
            result.push(c);
        }
    }

    result
}

// =============================================================================
// Assertion macros
// =============================================================================

/// Assert that a string contains a substring, with a readable failure message.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {{
        let haystack: &str = &$haystack;
        let needle: &str = &$needle;
        assert!(
            haystack.contains(needle),
            "expected to find {:?} in:\n{}",
            needle,
            haystack
        );
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_provider_plays_steps_then_repeats() {
        let provider = ScriptedProvider::new("p")
            .then_fail("503 upstream")
            .then_reply("hi")
            .always_fail("boom");
        let options = SendOptions::default();

        assert!(provider.send_message("a", &options).await.is_err());
        assert_eq!(provider.send_message("b", &options).await.unwrap().output, "hi");
        assert!(provider.send_message("c", &options).await.is_err());
        assert!(provider.send_message("d", &options).await.is_err());
        assert_eq!(provider.prompts(), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn recording_executor_returns_queued_outputs() {
        let executor = RecordingExecutor::new();
        executor.push_output("out", "", 0);
        let spec = CommandSpec::new("claude");
        let output = executor
            .execute(&spec, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(output.stdout, "out");
        assert_eq!(executor.specs().len(), 1);
        assert!(executor.which("claude").is_some());
        assert!(RecordingExecutor::new().without_binaries().which("claude").is_none());
    }

    #[test]
    fn strip_ansi_removes_sgr_sequences() {
        assert_eq!(strip_ansi_codes("\x1b[1;31merror:\x1b[0m boom"), "error: boom");
        assert_eq!(strip_ansi_codes("plain"), "plain");
    }

    #[test]
    fn test_dir_creates_nested_files() {
        let dir = TestDir::new();
        let path = dir.create_file("a/b/config.toml", "x = 1");
        assert!(path.exists());
        assert_contains!(fs::read_to_string(path).unwrap(), "x = 1");
    }
}
