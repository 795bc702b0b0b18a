//! OpenAI Codex (`codex exec`) adapter.
//!
//! Invocation: `codex exec [--model M] [--dangerously-bypass-approvals-and-sandbox]
//! [flags...] -- PROMPT`. The final agent message is printed as plain text,
//! optionally followed by a `tokens used: N` footer.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::classifier::{ErrorCategory, PatternTable};
use crate::core::models::{Capabilities, TokenUsage};

use super::base::{AgentCli, Invocation, ParsedOutput};

/// Adapter name in the registry.
pub const ADAPTER: &str = "codex";

/// CLI binary name.
const CLI_NAME: &str = "codex";

static PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    PatternTable::from_patterns(&[
        (
            ErrorCategory::RateLimited,
            &[r"you've hit your usage limit", r"rate_limit_exceeded"],
        ),
        (
            ErrorCategory::AuthExpired,
            &[r"codex login", r"token_expired", r"refresh token"],
        ),
        (ErrorCategory::QuotaExceeded, &[r"insufficient_quota"]),
        (
            ErrorCategory::Transient,
            &[r"stream disconnected", r"stream error", r"server_error"],
        ),
        (
            ErrorCategory::Permanent,
            &[r"model_not_found", r"unsupported model", r"context_length_exceeded"],
        ),
    ])
    .unwrap()
});

static TOKENS_FOOTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*tokens used:?\s*([\d,]+)\s*$").unwrap());

#[derive(Debug, Default, Clone, Copy)]
pub struct CodexCli;

impl AgentCli for CodexCli {
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
            session_resume: false,
        }
    }

    fn error_patterns(&self) -> &'static PatternTable {
        &PATTERNS
    }

    fn build_args(&self, invocation: &Invocation<'_>) -> Vec<String> {
        let mut args = vec!["exec".to_string()];
        if let Some(model) = invocation.model {
            args.extend(["--model".to_string(), model.to_string()]);
        }
        if invocation.dangerous_mode {
            args.push("--dangerously-bypass-approvals-and-sandbox".to_string());
        }
        args.extend(invocation.default_flags.iter().cloned());
        args.extend(["--".to_string(), invocation.prompt.to_string()]);
        args
    }

    fn parse_output(&self, stdout: &str) -> Result<ParsedOutput, String> {
        let usage = TOKENS_FOOTER
            .captures(stdout)
            .and_then(|c| c[1].replace(',', "").parse::<u64>().ok())
            .map(|total| TokenUsage {
                input_tokens: 0,
                output_tokens: 0,
                total_tokens: total,
            });
        let text = TOKENS_FOOTER.replace_all(stdout, "").trim().to_string();
        Ok(ParsedOutput {
            usage,
            ..ParsedOutput::text(text)
        })
    }
}
