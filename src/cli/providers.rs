//! `relay providers`: configured providers and whether their CLIs resolve.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::Serialize;

use crate::cli::args::{Cli, OutputFormat};
use crate::core::clock;
use crate::core::events::EventBus;
use crate::core::executor::{CommandExecutor, TokioExecutor};
use crate::core::models::ProviderKind;
use crate::core::provider_manager::{Availability, ProviderManager};
use crate::error::Result;
use crate::providers::ProviderRegistry;
use crate::render;
use crate::storage::{Config, ResolvedConfig};

/// One line of the provider listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderRow {
    pub name: String,
    pub adapter: String,
    pub binary: String,
    pub priority: i32,
    pub kind: ProviderKind,
    pub enabled: bool,
    pub installed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub capabilities: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    /// Absent for disabled providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<Availability>,
}

/// Execute the providers command.
///
/// # Errors
///
/// Returns configuration errors, or an error if output cannot be rendered.
pub async fn execute(cli: &Cli, format: OutputFormat, pretty: bool) -> Result<()> {
    let resolved = ResolvedConfig::resolve(cli, None)?;
    let registry = ProviderRegistry::with_builtins();
    let executor: Arc<dyn CommandExecutor> = Arc::new(TokioExecutor::new());
    let rows = collect_rows(&resolved.config, &registry, executor).await?;
    println!("{}", render::render_providers(&rows, format, pretty)?);
    Ok(())
}

/// Build the listing, resolving every binary concurrently.
///
/// # Errors
///
/// Returns configuration errors or [`crate::error::RelayError::InvalidProvider`]
/// for unknown adapters.
pub async fn collect_rows(
    config: &Config,
    registry: &ProviderRegistry,
    executor: Arc<dyn CommandExecutor>,
) -> Result<Vec<ProviderRow>> {
    let manager = ProviderManager::from_config(
        config,
        registry,
        executor.clone(),
        clock::system(),
        EventBus::new(),
    )?;
    let availability: HashMap<String, Availability> = manager
        .statuses()
        .into_iter()
        .map(|s| (s.name, s.availability))
        .collect();

    let mut built = Vec::new();
    for settings in config.provider_settings()? {
        let provider = registry.build(settings.clone(), executor.clone())?;
        built.push((settings, provider));
    }

    let lookups = built.iter().map(|(_, provider)| {
        let executor = executor.clone();
        let binary = provider.binary().to_string();
        tokio::task::spawn_blocking(move || executor.which(&binary))
    });
    let paths = join_all(lookups).await;

    let mut rows: Vec<ProviderRow> = built
        .into_iter()
        .zip(paths)
        .map(|((settings, provider), lookup)| {
            let path = lookup.unwrap_or_else(|e| {
                tracing::warn!(provider = %settings.name, error = %e, "Binary lookup failed");
                None
            });
            ProviderRow {
                availability: availability.get(&settings.name).cloned(),
                adapter: settings.adapter,
                binary: provider.binary().to_string(),
                priority: settings.priority,
                kind: settings.kind,
                enabled: settings.enabled,
                installed: path.is_some(),
                path: path.map(|p| p.display().to_string()),
                capabilities: provider.capabilities().enabled(),
                models: settings.models,
                name: settings.name,
            }
        })
        .collect();

    rows.sort_by(|a, b| {
        b.enabled
            .cmp(&a.enabled)
            .then(a.priority.cmp(&b.priority))
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(rows)
}
