//! Output rendering for human and robot modes.

pub mod error;
pub mod human;
pub mod robot;

use crate::cli::args::OutputFormat;
use crate::cli::providers::ProviderRow;
use crate::core::models::Response;
use crate::error::Result;

/// Render a successful response for stdout.
///
/// Human mode prints the agent output as-is; the footer is rendered
/// separately for stderr.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_response(response: &Response, format: OutputFormat, pretty: bool) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(response.output.clone()),
        OutputFormat::Json => robot::render_json("send", response, pretty),
    }
}

/// Render the provider list.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_providers(rows: &[ProviderRow], format: OutputFormat, pretty: bool) -> Result<String> {
    match format {
        OutputFormat::Human => Ok(human::render_providers(rows)),
        OutputFormat::Json => robot::render_json("providers", &rows, pretty),
    }
}
