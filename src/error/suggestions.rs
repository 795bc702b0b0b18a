//! Fix suggestion database for relay errors.
//!
//! Provides actionable fix suggestions mapped to specific error types,
//! including commands, context explanations, and prevention tips.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::core::classifier::ErrorCategory;

// =============================================================================
// Fix Suggestion Types
// =============================================================================

/// A fix suggestion for an error.
#[derive(Debug, Clone)]
pub struct FixSuggestion {
    /// Primary fix commands in order of preference.
    /// These should be copy-paste ready for the terminal.
    pub commands: Vec<String>,

    /// Explanation of why this error occurred.
    pub context: String,

    /// Tips to prevent this error in the future.
    pub prevention: Option<String>,

    /// Link to documentation for more information.
    pub doc_url: Option<String>,
}

impl FixSuggestion {
    /// Creates a new fix suggestion with required fields.
    #[must_use]
    pub fn new(commands: Vec<String>, context: impl Into<String>) -> Self {
        Self {
            commands,
            context: context.into(),
            prevention: None,
            doc_url: None,
        }
    }

    /// Builder: adds prevention tips.
    #[must_use]
    pub fn with_prevention(mut self, prevention: impl Into<String>) -> Self {
        self.prevention = Some(prevention.into());
        self
    }

    /// Builder: adds documentation URL.
    #[must_use]
    pub fn with_doc_url(mut self, url: impl Into<String>) -> Self {
        self.doc_url = Some(url.into());
        self
    }
}

// =============================================================================
// CLI Installation Helpers
// =============================================================================

/// Returns installation commands for an agent CLI binary.
#[must_use]
pub fn install_commands_for_cli(binary: &str) -> Vec<String> {
    match binary.to_lowercase().as_str() {
        "claude" | "claude-code" => vec![
            "npm install -g @anthropic-ai/claude-code".to_string(),
            "# Or: curl -fsSL https://claude.ai/install.sh | bash".to_string(),
        ],
        "codex" => vec![
            "npm install -g @openai/codex".to_string(),
            "# Or via homebrew: brew install codex".to_string(),
        ],
        "cursor-agent" | "cursor" => {
            vec!["curl https://cursor.com/install -fsS | bash".to_string()]
        }
        "gemini" | "gemini-cli" => vec!["npm install -g @google/gemini-cli".to_string()],
        _ => vec![format!(
            "# Install {binary} following its official documentation"
        )],
    }
}

/// Returns documentation URL for an agent CLI binary.
#[must_use]
pub fn install_doc_for_cli(binary: &str) -> Option<String> {
    match binary.to_lowercase().as_str() {
        "claude" | "claude-code" => {
            Some("https://docs.anthropic.com/en/docs/claude-code".to_string())
        }
        "codex" => Some("https://github.com/openai/codex".to_string()),
        "cursor-agent" | "cursor" => Some("https://docs.cursor.com/en/cli/overview".to_string()),
        "gemini" | "gemini-cli" => Some("https://github.com/google-gemini/gemini-cli".to_string()),
        _ => None,
    }
}

// =============================================================================
// Suggestion Generators
// =============================================================================

/// Generates fix suggestions for a CLI that rejected its credentials.
#[must_use]
pub fn authentication_suggestions(provider: &str, message: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                format!("# Log in again with the {provider} CLI"),
                format!("relay send --provider <other> \"...\"  # skip {provider} for now"),
            ],
            format!(
                "The {provider} CLI reported an authentication problem: {message}. \
                 relay never logs in on your behalf; the CLI must already be authenticated."
            ),
        )
        .with_prevention(
            "Keep more than one provider configured so requests fail over while \
             you re-authenticate.",
        ),
    ]
}

/// Generates fix suggestions for timeout errors.
#[must_use]
pub fn timeout_suggestions(provider: &str, seconds: u64) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![format!(
                "relay send --provider {provider} --timeout {} \"...\"",
                seconds.saturating_mul(2)
            )],
            format!(
                "The {provider} CLI did not finish within {seconds}s and was terminated."
            ),
        )
        .with_prevention(format!(
            "Raise `timeout_seconds` under [providers.{provider}] in the config file \
             for long-running prompts."
        )),
    ]
}

/// Generates fix suggestions for rate limit errors.
#[must_use]
pub fn rate_limited_suggestions(
    provider: &str,
    retry_after: Option<Duration>,
    message: &str,
) -> Vec<FixSuggestion> {
    let wait_cmd = retry_after.map_or_else(
        || "# Wait before retrying".to_string(),
        |d| format!("sleep {} && relay send --provider {provider} \"...\"", d.as_secs()),
    );

    let wait_info = retry_after.map_or_else(
        || "Wait before retrying.".to_string(),
        |d| format!("Try again in {} seconds.", d.as_secs()),
    );

    vec![
        FixSuggestion::new(
            vec![wait_cmd],
            format!("{provider} is rate limiting requests: {message}. {wait_info}"),
        )
        .with_prevention(
            "Configure `fallback_providers` under [general] so rate-limited requests \
             move to another provider automatically.",
        ),
    ]
}

/// Generates fix suggestions for a classified provider failure.
#[must_use]
pub fn provider_failure_suggestions(
    provider: &str,
    category: ErrorCategory,
    message: &str,
) -> Vec<FixSuggestion> {
    match category {
        ErrorCategory::QuotaExceeded => vec![
            FixSuggestion::new(
                vec!["relay providers".to_string()],
                format!("{provider} reports its quota or billing limit is exhausted: {message}"),
            )
            .with_prevention("Lower this provider's priority or disable it until the quota resets."),
        ],
        ErrorCategory::Transient | ErrorCategory::Timeout => vec![
            FixSuggestion::new(
                vec![format!("relay send --provider {provider} \"...\"")],
                format!("{provider} failed with a transient error: {message}. Retrying usually helps."),
            ),
        ],
        ErrorCategory::Permanent => vec![FixSuggestion::new(
            vec![format!("{provider} --help")],
            format!(
                "{provider} rejected the request: {message}. Retrying will not help; \
                 check the prompt, model name and default flags."
            ),
        )],
        _ => vec![FixSuggestion::new(
            vec!["relay -v send \"...\"".to_string()],
            format!("{provider} failed: {message}. Re-run with -v to see the CLI output."),
        )],
    }
}

/// Generates fix suggestions for an open circuit breaker.
#[must_use]
pub fn circuit_open_suggestions(provider: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec!["relay providers".to_string()],
            format!(
                "The circuit breaker for {provider} is open after repeated failures. \
                 It will admit a trial request once its timeout elapses."
            ),
        )
        .with_prevention(
            "Tune [circuit_breaker] failure_threshold and timeout_seconds if the \
             breaker trips too eagerly.",
        ),
    ]
}

/// Generates fix suggestions when every provider has been exhausted.
#[must_use]
pub fn no_providers_suggestions(
    attempted: &[String],
    earliest_reset: Option<DateTime<Utc>>,
) -> Vec<FixSuggestion> {
    let tried = if attempted.is_empty() {
        "no provider was available to try".to_string()
    } else {
        format!("tried {}", attempted.join(", "))
    };
    let mut commands = vec!["relay providers".to_string()];
    let mut context = format!("All configured providers failed or are unavailable ({tried}).");

    if let Some(reset) = earliest_reset {
        let wait = (reset - Utc::now()).num_seconds().max(0);
        commands.push(format!("sleep {wait} && relay send \"...\""));
        context.push_str(&format!(
            " The earliest rate limit resets at {}.",
            reset.format("%H:%M:%S UTC")
        ));
    }

    vec![
        FixSuggestion::new(commands, context)
            .with_prevention("Configure additional providers to widen the fallback chain."),
    ]
}

/// Generates fix suggestions for config parse errors.
#[must_use]
pub fn config_parse_suggestions(path: &str, message: &str) -> Vec<FixSuggestion> {
    vec![
        FixSuggestion::new(
            vec![
                format!("$EDITOR {path}"),
                "relay config --default > /tmp/relay-default.toml".to_string(),
            ],
            format!("The config file at {path} is not valid TOML: {message}"),
        )
        .with_prevention("Compare against `relay config --default` when editing by hand."),
    ]
}

/// Generates fix suggestions for config validation errors.
#[must_use]
pub fn config_invalid_suggestions(key: &str, message: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["relay config --path".to_string(), "relay config".to_string()],
        format!("Invalid value for `{key}`: {message}"),
    )]
}

/// Generates fix suggestions for unknown provider names.
#[must_use]
pub fn invalid_provider_suggestions(name: &str) -> Vec<FixSuggestion> {
    vec![FixSuggestion::new(
        vec!["relay providers".to_string()],
        format!(
            "'{name}' is not a configured provider. Built-in adapters are claude, \
             cursor, codex and gemini (aliases anthropic, cursor-agent, openai, google)."
        ),
    )]
}

/// Generates fix suggestions for CLI not found errors.
#[must_use]
pub fn cli_not_found_suggestions(provider: &str, binary: &str) -> Vec<FixSuggestion> {
    let mut suggestion = FixSuggestion::new(
        install_commands_for_cli(binary),
        format!(
            "The {binary} binary used by provider {provider} is not installed or not in PATH."
        ),
    )
    .with_prevention(format!(
        "Set `binary` under [providers.{provider}] if the CLI lives outside PATH."
    ));

    if let Some(url) = install_doc_for_cli(binary) {
        suggestion = suggestion.with_doc_url(url);
    }

    vec![suggestion]
}
