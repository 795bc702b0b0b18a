//! Error rendering for relay.
//!
//! Colored error output with fix suggestions for terminals, plain text for
//! pipes and `--no-color`, and a JSON object for machine consumers.

use colored::Colorize;
use serde::Serialize;

use crate::cli::args::OutputFormat;
use crate::error::{FixSuggestion, ProviderAttempt, RelayError};

// =============================================================================
// Public API
// =============================================================================

/// Render an error for stderr.
///
/// Uses colored output only for the human format, with color enabled and
/// stderr attached to a terminal.
#[must_use]
pub fn render_error(error: &RelayError, format: OutputFormat, no_color: bool, pretty: bool) -> String {
    match format {
        OutputFormat::Json => render_error_json(error, pretty),
        OutputFormat::Human => {
            if !no_color && crate::util::env::stderr_is_tty() {
                render_colored(error)
            } else {
                render_simple(error)
            }
        }
    }
}

/// Render error as structured JSON.
#[must_use]
pub fn render_error_json(error: &RelayError, pretty: bool) -> String {
    let error_json = ErrorJson::from_error(error);
    let rendered = if pretty {
        serde_json::to_string_pretty(&error_json)
    } else {
        serde_json::to_string(&error_json)
    };
    rendered.unwrap_or_else(|_| render_simple(error))
}

// =============================================================================
// Terminal Rendering
// =============================================================================

fn render_colored(error: &RelayError) -> String {
    let suggestions = error.fix_suggestions();
    let mut lines = vec![format!(
        "{} {} {}",
        "error:".red().bold(),
        headline(error).white().bold(),
        format!("[{}]", error.error_code()).dimmed()
    )];

    if let Some(attempts) = attempts_of(error) {
        lines.push(String::new());
        lines.push(format!("{}", "Attempts:".yellow().bold()));
        for attempt in attempts {
            lines.push(format!(
                "  {} {}",
                format!("{}:", attempt.provider).cyan(),
                attempt.message
            ));
        }
        if let Some(reset) = reset_line(error) {
            lines.push(format!("  {}", reset.yellow()));
        }
    }

    if !suggestions.is_empty() {
        lines.push(String::new());
        lines.push(format!("{}", "How to fix:".yellow().bold()));
        for (i, suggestion) in suggestions.iter().enumerate() {
            for (j, cmd) in suggestion.commands.iter().enumerate() {
                let prefix = if j == 0 {
                    format!("  {}. ", i + 1)
                } else {
                    "     Or: ".to_string()
                };
                lines.push(format!("{prefix}{}", cmd.cyan()));
            }
        }
    }

    if let Some(first) = suggestions.first() {
        if !first.context.is_empty() {
            lines.push(String::new());
            lines.push(format!("{}", "Why this happened:".bold()));
            lines.extend(wrap_text(&first.context, 72).into_iter().map(|l| format!("  {}", l.dimmed())));
        }
        if let Some(prevention) = &first.prevention {
            lines.push(String::new());
            lines.push(format!("{}", "Prevention:".green().bold()));
            lines.extend(wrap_text(prevention, 72).into_iter().map(|l| format!("  {l}")));
        }
        if let Some(url) = &first.doc_url {
            lines.push(String::new());
            lines.push(format!("{} {}", "Docs:".dimmed(), url.underline()));
        }
    }

    lines.join("\n")
}

/// Plain text: no ANSI codes, one fix line.
fn render_simple(error: &RelayError) -> String {
    let mut lines = vec![format!("Error [{}]: {}", error.error_code(), headline(error))];

    if let Some(attempts) = attempts_of(error) {
        for attempt in attempts {
            lines.push(format!("  {}: {}", attempt.provider, attempt.message));
        }
    }
    if let Some(reset) = reset_line(error) {
        lines.push(reset);
    }

    let fix = error
        .fix_suggestions()
        .into_iter()
        .flat_map(|s| s.commands)
        .find(|cmd| !cmd.starts_with('#'));
    if let Some(cmd) = fix {
        lines.push(format!("Fix: {cmd}"));
    }

    lines.join("\n")
}

/// The message line; exhaustion and escalation errors list attempts separately.
fn headline(error: &RelayError) -> String {
    match error {
        RelayError::NoProvidersAvailable { attempts, .. } if !attempts.is_empty() => format!(
            "no providers available after trying {}",
            error.attempted_providers().join(", ")
        ),
        RelayError::Escalated { cause, .. } => cause.to_string(),
        _ => error.to_string(),
    }
}

fn attempts_of(error: &RelayError) -> Option<&[ProviderAttempt]> {
    Some(error.attempts()).filter(|attempts| !attempts.is_empty())
}

/// When the first rate-limited provider frees up.
fn reset_line(error: &RelayError) -> Option<String> {
    match error {
        RelayError::NoProvidersAvailable {
            earliest_reset: Some(at),
            ..
        } => Some(format!(
            "Earliest reset: {}",
            crate::util::format_reset(*at, chrono::Utc::now())
        )),
        _ => None,
    }
}

// =============================================================================
// JSON Rendering
// =============================================================================

#[derive(Serialize)]
struct ErrorJson<'a> {
    error_code: &'static str,
    class: &'static str,
    message: String,
    is_retryable: bool,
    exit_code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    provider: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempts: Option<&'a [ProviderAttempt]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    earliest_reset: Option<String>,
    suggestions: Vec<SuggestionJson>,
}

#[derive(Serialize)]
struct SuggestionJson {
    commands: Vec<String>,
    context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prevention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    doc_url: Option<String>,
}

impl From<FixSuggestion> for SuggestionJson {
    fn from(s: FixSuggestion) -> Self {
        Self {
            commands: s.commands,
            context: s.context,
            prevention: s.prevention,
            doc_url: s.doc_url,
        }
    }
}

impl<'a> ErrorJson<'a> {
    fn from_error(error: &'a RelayError) -> Self {
        let earliest_reset = match error {
            RelayError::NoProvidersAvailable {
                earliest_reset: Some(at),
                ..
            } => Some(at.to_rfc3339()),
            _ => None,
        };
        Self {
            error_code: error.error_code(),
            class: error.class().description(),
            message: error.to_string(),
            is_retryable: error.is_retryable(),
            exit_code: error.exit_code().into(),
            provider: error.provider(),
            category: error.category().map(|c| c.as_str()),
            retry_after_seconds: error.retry_after().map(|d| d.as_secs()),
            attempts: attempts_of(error),
            earliest_reset,
            suggestions: error
                .fix_suggestions()
                .into_iter()
                .map(SuggestionJson::from)
                .collect(),
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Greedy word wrap.
fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in text.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current_line));
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() || lines.is_empty() {
        lines.push(current_line);
    }

    lines
}
