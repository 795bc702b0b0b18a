//! Claude Code (`claude`) adapter.
//!
//! Invocation: `claude --print --output-format json [--model M]
//! [--dangerously-skip-permissions] [--resume ID] [flags...]` with the prompt
//! on stdin, which avoids argv length limits for large generated prompts.

use std::sync::LazyLock;

use crate::core::classifier::{ErrorCategory, PatternTable};
use crate::core::models::Capabilities;

use super::base::{AgentCli, Invocation, ParsedOutput, parse_result_envelope};

/// Adapter name in the registry.
pub const ADAPTER: &str = "claude";

/// CLI binary name.
const CLI_NAME: &str = "claude";

static PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    PatternTable::from_patterns(&[
        (
            ErrorCategory::RateLimited,
            &[r"usage limit reached", r"rate_limit_error", r"\b429\b"],
        ),
        (
            ErrorCategory::AuthExpired,
            &[
                r"invalid api key",
                r"please run /login",
                r"oauth token has expired",
                r"authentication_error",
            ],
        ),
        (ErrorCategory::QuotaExceeded, &[r"credit balance is too low"]),
        (
            ErrorCategory::Transient,
            &[r"overloaded_error", r"\b529\b", r"api error: 5\d\d"],
        ),
        (
            ErrorCategory::Permanent,
            &[r"invalid_request_error", r"prompt is too long"],
        ),
    ])
    .unwrap()
});

#[derive(Debug, Default, Clone, Copy)]
pub struct ClaudeCli;

impl AgentCli for ClaudeCli {
    fn default_binary(&self) -> &'static str {
        CLI_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: true,
            mcp: true,
            dangerous_mode: true,
            vision: true,
            tool_use: true,
            session_resume: true,
        }
    }

    fn error_patterns(&self) -> &'static PatternTable {
        &PATTERNS
    }

    fn build_args(&self, invocation: &Invocation<'_>) -> Vec<String> {
        let mut args = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        if let Some(model) = invocation.model {
            args.extend(["--model".to_string(), model.to_string()]);
        }
        if invocation.dangerous_mode {
            args.push("--dangerously-skip-permissions".to_string());
        }
        if let Some(session) = invocation.session {
            args.extend(["--resume".to_string(), session.to_string()]);
        }
        args.extend(invocation.default_flags.iter().cloned());
        args
    }

    fn prompt_via_stdin(&self) -> bool {
        true
    }

    fn parse_output(&self, stdout: &str) -> Result<ParsedOutput, String> {
        parse_result_envelope(stdout)
    }
}
