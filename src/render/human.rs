//! Human-readable output using `colored`.

use std::fmt::Write as _;

use colored::Colorize;

use crate::cli::providers::ProviderRow;
use crate::core::models::Response;
use crate::core::provider_manager::Availability;
use crate::util::{format_cost, format_duration, format_tokens};

/// One-line summary of who answered and what it cost, for stderr.
#[must_use]
pub fn render_response_footer(response: &Response) -> String {
    let mut parts = vec![format!("via {}", response.provider.bold())];
    if let Some(model) = &response.model {
        parts.push(model.clone());
    }
    parts.push(format_duration(response.duration));
    if let Some(usage) = response.usage {
        parts.push(format!(
            "{} tokens ({} in / {} out)",
            format_tokens(usage.total_tokens),
            format_tokens(usage.input_tokens),
            format_tokens(usage.output_tokens)
        ));
    }
    if let Some(cost) = response.cost_usd {
        parts.push(format_cost(cost));
    }
    if let Some(session) = &response.session_id {
        parts.push(format!("session {session}"));
    }
    format!("{}", parts.join(" · ").dimmed())
}

/// Table of configured providers.
#[must_use]
pub fn render_providers(rows: &[ProviderRow]) -> String {
    if rows.is_empty() {
        return "No providers configured.".to_string();
    }

    let name_width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0).max(8);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        format!(
            "{:<name_width$}  {:<8}  {:>3}  {:<13}  {}",
            "PROVIDER", "ADAPTER", "PRI", "KIND", "STATUS"
        )
        .bold()
    );

    for row in rows {
        let status = if !row.enabled {
            "disabled".dimmed().to_string()
        } else if !row.installed {
            format!("{} ({} not on PATH)", "missing".red(), row.binary)
        } else {
            match &row.availability {
                Some(Availability::Ready) | None => "ready".green().to_string(),
                Some(other) => other.reason().yellow().to_string(),
            }
        };
        let _ = writeln!(
            out,
            "{:<name_width$}  {:<8}  {:>3}  {:<13}  {}",
            row.name.cyan(),
            row.adapter,
            row.priority,
            row.kind.as_str(),
            status
        );
        if let Some(path) = &row.path {
            let _ = writeln!(out, "{:<name_width$}  {}", "", path.dimmed());
        }
        if !row.capabilities.is_empty() {
            let _ = writeln!(
                out,
                "{:<name_width$}  {}",
                "",
                row.capabilities.join(", ").dimmed()
            );
        }
    }

    out
}
