//! Gemini CLI (`gemini`) adapter.
//!
//! Invocation: `gemini [--model M] [--yolo] [flags...] --prompt=PROMPT`,
//! plain-text output.

use std::sync::LazyLock;

use crate::core::classifier::{ErrorCategory, PatternTable};
use crate::core::models::Capabilities;

use super::base::{AgentCli, Invocation, ParsedOutput};

/// Adapter name in the registry.
pub const ADAPTER: &str = "gemini";

/// CLI binary name.
const CLI_NAME: &str = "gemini";

static PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    PatternTable::from_patterns(&[
        (
            ErrorCategory::RateLimited,
            &[r"resource has been exhausted", r"quota exceeded for quota metric"],
        ),
        (
            ErrorCategory::AuthExpired,
            &[r"unauthenticated", r"gemini_api_key", r"login required"],
        ),
        (ErrorCategory::Transient, &[r"\bunavailable\b", r"internal error"]),
        (ErrorCategory::Permanent, &[r"invalid_argument"]),
    ])
    .unwrap()
});

#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiCli;

impl AgentCli for GeminiCli {
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
        let mut args = Vec::new();
        if let Some(model) = invocation.model {
            args.extend(["--model".to_string(), model.to_string()]);
        }
        if invocation.dangerous_mode {
            args.push("--yolo".to_string());
        }
        args.extend(invocation.default_flags.iter().cloned());
        // Attached form so a prompt starting with `-` is never read as a flag.
        args.push(format!("--prompt={}", invocation.prompt));
        args
    }

    fn parse_output(&self, stdout: &str) -> Result<ParsedOutput, String> {
        Ok(ParsedOutput::text(stdout.trim()))
    }
}
