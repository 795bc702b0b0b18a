//! Adapter registry: name → factory.
//!
//! Configured providers name an adapter (by default their own name). The
//! registry resolves aliases such as `anthropic` → `claude` and builds the
//! provider through the registered factory. New adapters can be registered
//! at runtime.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use super::claude::{self, ClaudeCli};
use super::codex::{self, CodexCli};
use super::cursor::{self, CursorCli};
use super::gemini::{self, GeminiCli};
use super::{AgentCli, CliProvider, Provider, ProviderSettings};
use crate::core::executor::CommandExecutor;
use crate::error::{RelayError, Result};

/// Inputs handed to a factory.
#[derive(Debug, Clone)]
pub struct ProviderContext {
    pub settings: ProviderSettings,
    pub executor: Arc<dyn CommandExecutor>,
}

/// Builds a provider from its settings.
pub type ProviderFactory = Arc<dyn Fn(ProviderContext) -> Arc<dyn Provider> + Send + Sync>;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
    aliases: HashMap<String, String>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("adapters", &self.names())
            .field("aliases", &self.aliases())
            .finish()
    }
}

fn cli_factory<A: AgentCli + Copy>(cli: A) -> ProviderFactory {
    Arc::new(move |ctx: ProviderContext| {
        Arc::new(CliProvider::new(cli, ctx.settings, ctx.executor)) as Arc<dyn Provider>
    })
}

impl ProviderRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in adapters and their aliases.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(claude::ADAPTER, cli_factory(ClaudeCli));
        registry.register(cursor::ADAPTER, cli_factory(CursorCli));
        registry.register(codex::ADAPTER, cli_factory(CodexCli));
        registry.register(gemini::ADAPTER, cli_factory(GeminiCli));

        for (alias, target) in [
            ("anthropic", claude::ADAPTER),
            ("claude-code", claude::ADAPTER),
            ("cursor-agent", cursor::ADAPTER),
            ("openai", codex::ADAPTER),
            ("google", gemini::ADAPTER),
        ] {
            registry.alias(alias, target);
        }
        registry
    }

    /// Register (or replace) an adapter.
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) {
        let name = name.into().to_lowercase();
        self.aliases.remove(&name);
        self.factories.insert(name, factory);
    }

    /// Make `alias` resolve to `target`.
    pub fn alias(&mut self, alias: impl Into<String>, target: impl Into<String>) {
        self.aliases
            .insert(alias.into().to_lowercase(), target.into().to_lowercase());
    }

    /// Canonical adapter name for a name or alias.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        let lower = name.to_lowercase();
        let canonical = self.aliases.get(&lower).cloned().unwrap_or(lower);
        self.factories
            .get_key_value(&canonical)
            .map(|(key, _)| key.as_str())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_some()
    }

    /// Build the provider described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidProvider`] if the adapter is unknown.
    pub fn build(
        &self,
        settings: ProviderSettings,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Arc<dyn Provider>> {
        let adapter = self
            .resolve(&settings.adapter)
            .ok_or_else(|| RelayError::InvalidProvider(settings.adapter.clone()))?;
        let factory = &self.factories[adapter];
        tracing::debug!(provider = %settings.name, adapter, "Building provider");
        Ok(factory(ProviderContext { settings, executor }))
    }

    /// Registered adapter names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Alias → adapter pairs, sorted by alias.
    #[must_use]
    pub fn aliases(&self) -> BTreeMap<&str, &str> {
        self.aliases
            .iter()
            .map(|(a, t)| (a.as_str(), t.as_str()))
            .collect()
    }
}
