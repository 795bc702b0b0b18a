//! Cursor Agent (`cursor-agent`) adapter.
//!
//! Invocation: `cursor-agent --print --output-format json [--model M]
//! [--force] [--resume ID] [flags...] -- PROMPT`.
//!
//! Cursor surfaces backend overload as gRPC `resource_exhausted`; that is
//! treated as transient, not as a rate limit.

use std::sync::LazyLock;

use crate::core::classifier::{ErrorCategory, PatternTable};
use crate::core::models::Capabilities;

use super::base::{AgentCli, Invocation, ParsedOutput, parse_result_envelope};

/// Adapter name in the registry.
pub const ADAPTER: &str = "cursor";

/// CLI binary name.
const CLI_NAME: &str = "cursor-agent";

static PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    PatternTable::from_patterns(&[
        (
            ErrorCategory::RateLimited,
            &[r"you've hit your usage limit", r"rate limited"],
        ),
        (
            ErrorCategory::AuthExpired,
            &[r"not logged in", r"cursor-agent login", r"unauthenticated"],
        ),
        (ErrorCategory::QuotaExceeded, &[r"upgrade to (pro|ultra)"]),
        (
            ErrorCategory::Transient,
            &[r"resource_exhausted", r"connection (reset|refused)", r"\bunavailable\b"],
        ),
        (ErrorCategory::Permanent, &[r"cannot use this model", r"invalid_argument"]),
    ])
    .unwrap()
});

#[derive(Debug, Default, Clone, Copy)]
pub struct CursorCli;

impl AgentCli for CursorCli {
    fn default_binary(&self) -> &'static str {
        CLI_NAME
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            streaming: true,
            mcp: true,
            dangerous_mode: true,
            vision: false,
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
            args.push("--force".to_string());
        }
        if let Some(session) = invocation.session {
            args.extend(["--resume".to_string(), session.to_string()]);
        }
        args.extend(invocation.default_flags.iter().cloned());
        args.extend(["--".to_string(), invocation.prompt.to_string()]);
        args
    }

    fn parse_output(&self, stdout: &str) -> Result<ParsedOutput, String> {
        parse_result_envelope(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classifier::classify;

    #[test]
    fn prompt_is_last_argument() {
        let args = CursorCli.build_args(&Invocation {
            prompt: "fix the bug",
            model: None,
            dangerous_mode: true,
            session: None,
            default_flags: &[],
        });
        assert_eq!(
            args,
            vec!["--print", "--output-format", "json", "--force", "--", "fix the bug"]
        );
        assert!(!CursorCli.prompt_via_stdin());
    }

    #[test]
    fn flag_like_prompt_stays_positional() {
        let args = CursorCli.build_args(&Invocation {
            prompt: "--force",
            model: None,
            dangerous_mode: false,
            session: None,
            default_flags: &[],
        });
        assert_eq!(args, vec!["--print", "--output-format", "json", "--", "--force"]);
    }

    #[test]
    fn resource_exhausted_is_transient() {
        assert_eq!(
            classify("ConnectError: [resource_exhausted] Error", CursorCli.error_patterns()),
            ErrorCategory::Transient
        );
    }

    #[test]
    fn login_errors_are_auth() {
        assert_eq!(
            classify(
                "Error: Not logged in. Run cursor-agent login",
                CursorCli.error_patterns()
            ),
            ErrorCategory::AuthExpired
        );
    }
}
