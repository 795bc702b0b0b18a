//! `relay send`: deliver one prompt with failover.

use std::io::Read as _;
use std::path::Path;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::cli::args::{Cli, OutputFormat, SendArgs};
use crate::core::clock;
use crate::core::conductor::Conductor;
use crate::core::events::{EventBus, RelayEvent, TracingSink};
use crate::core::executor::TokioExecutor;
use crate::core::models::SendOptions;
use crate::core::provider_manager::ProviderManager;
use crate::error::{RelayError, Result};
use crate::providers::ProviderRegistry;
use crate::render;
use crate::storage::{Config, ConfigSource, ResolvedConfig};
use crate::util::env::{stderr_is_tty, stdin_is_tty};

/// Execute the send command.
///
/// # Errors
///
/// Returns configuration errors, prompt input errors, or the conductor's
/// error once every provider has been tried.
pub async fn execute(cli: &Cli, args: &SendArgs, pretty: bool) -> Result<()> {
    args.validate()?;
    let resolved = ResolvedConfig::resolve(cli, Some(args))?;
    let prompt = read_prompt(args)?;
    let registry = ProviderRegistry::with_builtins();

    // The config default is already the manager's first choice.
    let preferred = match resolved.sources.provider {
        ConfigSource::Cli | ConfigSource::Env => resolved
            .provider
            .as_deref()
            .map(|name| resolve_provider_name(name, &resolved.config, &registry)),
        ConfigSource::ConfigFile | ConfigSource::Default => None,
    };
    tracing::debug!(
        provider = preferred.as_deref().unwrap_or("auto"),
        source = %resolved.sources.provider,
        "Resolved provider"
    );

    let events = EventBus::new();
    events.subscribe(TracingSink);
    if args.events {
        events.subscribe(|event: &RelayEvent| {
            if let Ok(line) = serde_json::to_string(event) {
                eprintln!("{line}");
            }
        });
    }

    let manager = Arc::new(ProviderManager::from_config(
        &resolved.config,
        &registry,
        Arc::new(TokioExecutor::new()),
        clock::system(),
        events,
    )?);
    let mut conductor = Conductor::new(manager, resolved.config.retry_policy());
    if let Some(n) = resolved.max_attempts {
        conductor = conductor.with_max_attempts(n);
    }

    let cancel = CancellationToken::new();
    let interrupt = spawn_interrupt_watcher(cancel.clone());

    let options = SendOptions {
        model: args.model.clone(),
        timeout: resolved.timeout,
        dangerous_mode: args.dangerous,
        session: args.session.clone(),
        cancel,
    };
    let result = conductor
        .send_message(&prompt, preferred.as_deref(), options)
        .await;
    interrupt.abort();
    let response = result?;

    println!(
        "{}",
        render::render_response(&response, resolved.format, pretty)?
    );
    if resolved.format == OutputFormat::Human && stderr_is_tty() {
        eprintln!("{}", render::human::render_response_footer(&response));
    }
    Ok(())
}

/// Cancel `token` on Ctrl-C.
fn spawn_interrupt_watcher(token: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling in-flight request");
            token.cancel();
        }
    })
}

/// Prompt from the argument, `--file`, or piped stdin.
fn read_prompt(args: &SendArgs) -> Result<String> {
    let prompt = if let Some(prompt) = &args.prompt {
        prompt.clone()
    } else if let Some(path) = &args.file {
        read_prompt_file(path)?
    } else if stdin_is_tty() {
        return Err(RelayError::ConfigInvalid {
            key: "prompt".to_string(),
            message: "no prompt given; pass it as an argument, with --file, or on stdin"
                .to_string(),
        });
    } else {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    };
    non_empty_prompt(prompt)
}

fn read_prompt_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| RelayError::ConfigInvalid {
        key: "--file".to_string(),
        message: format!("cannot read {}: {e}", path.display()),
    })
}

fn non_empty_prompt(prompt: String) -> Result<String> {
    if prompt.trim().is_empty() {
        return Err(RelayError::ConfigInvalid {
            key: "prompt".to_string(),
            message: "prompt is empty".to_string(),
        });
    }
    Ok(prompt)
}

/// Map a user-supplied name to a configured provider.
///
/// Exact config names win. Otherwise an adapter name or alias picks the
/// highest-priority enabled provider using that adapter. Unknown names pass
/// through so selection reports them.
fn resolve_provider_name(name: &str, config: &Config, registry: &ProviderRegistry) -> String {
    let lower = name.trim().to_lowercase();
    if config.providers.contains_key(&lower) {
        return lower;
    }
    let Some(adapter) = registry.resolve(&lower) else {
        return lower;
    };
    config
        .providers
        .iter()
        .filter(|(_, p)| p.enabled)
        .filter(|(key, p)| registry.resolve(p.adapter.as_deref().unwrap_or(key)) == Some(adapter))
        .min_by_key(|(_, p)| p.priority)
        .map_or(lower, |(key, _)| key.clone())
}
