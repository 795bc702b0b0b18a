//! Shared driver for CLI-backed providers.
//!
//! Each adapter describes its CLI through [`AgentCli`]: how to build the
//! argument vector, how the prompt is delivered and how stdout is parsed.
//! [`CliProvider`] does the rest: model/timeout resolution, execution,
//! failure classification and response normalization.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use super::{Provider, ProviderSettings};
use crate::core::classifier::PatternTable;
use crate::core::executor::{CommandExecutor, CommandSpec, ExecError};
use crate::core::models::{Capabilities, Response, SendOptions, TokenUsage};
use crate::error::{RelayError, Result, classified_error};

// =============================================================================
// Adapter description
// =============================================================================

/// Everything an adapter needs to build one command line.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub prompt: &'a str,
    pub model: Option<&'a str>,
    pub dangerous_mode: bool,
    pub session: Option<&'a str>,
    pub default_flags: &'a [String],
}

/// Normalized CLI output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedOutput {
    pub text: String,
    pub usage: Option<TokenUsage>,
    pub session_id: Option<String>,
    pub cost_usd: Option<f64>,
    /// Model reported by the CLI, when it reports one.
    pub model: Option<String>,
    /// The CLI exited zero but flagged the result as an error.
    pub is_error: bool,
}

impl ParsedOutput {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Static description of one agent CLI.
pub trait AgentCli: Send + Sync + std::fmt::Debug + 'static {
    /// Binary name when the config does not override it.
    fn default_binary(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities;

    fn error_patterns(&self) -> &'static PatternTable;

    /// Argument vector, excluding the binary.
    fn build_args(&self, invocation: &Invocation<'_>) -> Vec<String>;

    /// Deliver the prompt on stdin instead of argv.
    fn prompt_via_stdin(&self) -> bool {
        false
    }

    /// Parse successful stdout.
    ///
    /// # Errors
    ///
    /// Returns a description when the output is not in the expected format;
    /// the driver then falls back to the raw text.
    fn parse_output(&self, stdout: &str) -> std::result::Result<ParsedOutput, String>;
}

// =============================================================================
// Driver
// =============================================================================

/// A [`Provider`] that drives an [`AgentCli`] through a [`CommandExecutor`].
#[derive(Debug)]
pub struct CliProvider<A> {
    cli: A,
    settings: ProviderSettings,
    executor: Arc<dyn CommandExecutor>,
    patterns: PatternTable,
}

impl<A: AgentCli> CliProvider<A> {
    #[must_use]
    pub fn new(cli: A, settings: ProviderSettings, executor: Arc<dyn CommandExecutor>) -> Self {
        let patterns = cli.error_patterns().merged(&settings.extra_patterns);
        Self {
            cli,
            settings,
            executor,
            patterns,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Build the command for a prompt without running it.
    #[must_use]
    pub fn command_for(&self, prompt: &str, options: &SendOptions) -> CommandSpec {
        let model = self.model_for(options);
        let session = options.session.as_deref();
        if session.is_some() && !self.cli.capabilities().session_resume {
            tracing::warn!(
                provider = %self.settings.name,
                "Session resume not supported by this CLI, starting a new session"
            );
        }

        let invocation = Invocation {
            prompt,
            model,
            dangerous_mode: options.dangerous_mode,
            session: session.filter(|_| self.cli.capabilities().session_resume),
            default_flags: &self.settings.default_flags,
        };

        let mut spec = CommandSpec::new(self.binary())
            .args(self.cli.build_args(&invocation))
            .envs(&self.settings.env)
            .timeout(options.timeout.unwrap_or(self.settings.timeout));
        if self.cli.prompt_via_stdin() {
            spec = spec.stdin(prompt);
        }
        spec
    }

    fn model_for<'a>(&'a self, options: &'a SendOptions) -> Option<&'a str> {
        options
            .model
            .as_deref()
            .or_else(|| self.settings.models.first().map(String::as_str))
    }

    fn translate(&self, err: ExecError) -> RelayError {
        let name = self.settings.name.clone();
        match err {
            ExecError::NotFound(binary) => RelayError::CliNotFound {
                provider: name,
                binary,
            },
            ExecError::Timeout { after, .. } => RelayError::Timeout {
                provider: name,
                seconds: after.as_secs(),
            },
            ExecError::Cancelled(_) => RelayError::Cancelled,
            other @ (ExecError::Spawn { .. } | ExecError::Io { .. }) => {
                classified_error(&name, &other.to_string(), &self.patterns, None)
            }
        }
    }
}

#[async_trait]
impl<A: AgentCli> Provider for CliProvider<A> {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn binary(&self) -> &str {
        self.settings
            .binary
            .as_deref()
            .unwrap_or_else(|| self.cli.default_binary())
    }

    fn capabilities(&self) -> Capabilities {
        self.cli.capabilities()
    }

    fn error_patterns(&self) -> &PatternTable {
        &self.patterns
    }

    fn available(&self) -> bool {
        self.executor.which(self.binary()).is_some()
    }

    async fn send_message(&self, prompt: &str, options: &SendOptions) -> Result<Response> {
        let spec = self.command_for(prompt, options);
        let output = self
            .executor
            .execute(&spec, &options.cancel)
            .await
            .map_err(|e| self.translate(e))?;

        if !output.success() {
            tracing::debug!(
                provider = %self.settings.name,
                exit_code = output.exit_code,
                "Provider exited with failure"
            );
            return Err(classified_error(
                &self.settings.name,
                output.failure_text(),
                &self.patterns,
                Some(output.exit_code),
            ));
        }

        let parsed = self.cli.parse_output(&output.stdout).unwrap_or_else(|reason| {
            tracing::warn!(
                provider = %self.settings.name,
                reason = %reason,
                "Unrecognized CLI output, using raw text"
            );
            ParsedOutput::text(output.stdout.trim())
        });

        if parsed.is_error {
            return Err(classified_error(
                &self.settings.name,
                &parsed.text,
                &self.patterns,
                Some(output.exit_code),
            ));
        }

        let stderr = output.stderr.trim();
        Ok(Response {
            output: parsed.text,
            exit_code: output.exit_code,
            duration: output.duration,
            provider: self.settings.name.clone(),
            model: parsed
                .model
                .or_else(|| self.model_for(options).map(str::to_string)),
            usage: parsed.usage,
            error: (!stderr.is_empty()).then(|| stderr.to_string()),
            session_id: parsed.session_id,
            cost_usd: parsed.cost_usd,
        })
    }
}

// =============================================================================
// Shared parsing
// =============================================================================

/// `{"type":"result", ...}` envelope printed by `--output-format json` CLIs.
#[derive(Debug, Deserialize)]
struct ResultEnvelope {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    is_error: bool,
    #[serde(default)]
    subtype: Option<String>,
    #[serde(default)]
    session_id: Option<String>,
    #[serde(default, alias = "cost_usd")]
    total_cost_usd: Option<f64>,
    #[serde(default)]
    usage: Option<EnvelopeUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

/// Parse a JSON result envelope.
///
/// Some CLI versions print progress lines first, so the last line that parses
/// as an envelope wins.
///
/// # Errors
///
/// Returns a description when no line is a JSON envelope.
pub fn parse_result_envelope(stdout: &str) -> std::result::Result<ParsedOutput, String> {
    let envelope = serde_json::from_str::<ResultEnvelope>(stdout.trim())
        .ok()
        .or_else(|| {
            stdout
                .lines()
                .rev()
                .filter(|line| line.trim_start().starts_with('{'))
                .find_map(|line| serde_json::from_str::<ResultEnvelope>(line).ok())
        })
        .ok_or_else(|| "no JSON result envelope in output".to_string())?;

    let is_error = envelope.is_error
        || envelope
            .subtype
            .as_deref()
            .is_some_and(|s| s.starts_with("error"));
    let text = envelope
        .result
        .or_else(|| envelope.subtype.filter(|_| is_error))
        .unwrap_or_default();

    Ok(ParsedOutput {
        text,
        usage: envelope.usage.map(|u| {
            TokenUsage::new(
                u.input_tokens + u.cache_creation_input_tokens + u.cache_read_input_tokens,
                u.output_tokens,
            )
        }),
        session_id: envelope.session_id,
        cost_usd: envelope.total_cost_usd,
        model: envelope.model,
        is_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_with_usage() {
        let out = r#"{"type":"result","subtype":"success","is_error":false,"result":"Done.","session_id":"abc","total_cost_usd":0.02,"usage":{"input_tokens":10,"cache_read_input_tokens":5,"output_tokens":7}}"#;
        let parsed = parse_result_envelope(out).unwrap();
        assert_eq!(parsed.text, "Done.");
        assert_eq!(parsed.session_id.as_deref(), Some("abc"));
        assert_eq!(parsed.usage, Some(TokenUsage::new(15, 7)));
        assert_eq!(parsed.cost_usd, Some(0.02));
        assert!(!parsed.is_error);
    }

    #[test]
    fn envelope_after_progress_lines() {
        let out = "warming up\n{\"type\":\"result\",\"result\":\"ok\"}\n";
        assert_eq!(parse_result_envelope(out).unwrap().text, "ok");
    }

    #[test]
    fn envelope_error_flag() {
        let out = r#"{"type":"result","subtype":"success","is_error":true,"result":"API Error: 529 overloaded_error"}"#;
        let parsed = parse_result_envelope(out).unwrap();
        assert!(parsed.is_error);
        assert!(parsed.text.contains("529"));
    }

    #[test]
    fn envelope_error_subtype_without_result() {
        let out = r#"{"type":"result","subtype":"error_max_turns","is_error":false}"#;
        let parsed = parse_result_envelope(out).unwrap();
        assert!(parsed.is_error);
        assert_eq!(parsed.text, "error_max_turns");
    }

    #[test]
    fn plain_text_is_rejected() {
        assert!(parse_result_envelope("just words").is_err());
    }
}
