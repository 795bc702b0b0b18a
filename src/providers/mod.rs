//! Agent CLI providers.
//!
//! A [`Provider`] wraps one external agent CLI. Built-in adapters live in
//! submodules and share the [`base::CliProvider`] driver; the
//! [`registry::ProviderRegistry`] maps adapter names (and aliases) to
//! factories so callers can plug in their own.

pub mod base;
pub mod claude;
pub mod codex;
pub mod cursor;
pub mod gemini;
pub mod registry;

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::core::circuit_breaker::CircuitBreakerSettings;
use crate::core::classifier::PatternTable;
use crate::core::models::{Capabilities, ProviderKind, Response, SendOptions};
use crate::error::Result;

pub use base::{AgentCli, CliProvider};
pub use registry::{ProviderContext, ProviderFactory, ProviderRegistry};

static NO_PATTERNS: PatternTable = PatternTable::empty();

/// One external agent process.
///
/// Implementations never touch orchestration state; the conductor records
/// outcomes with the provider manager.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Configured identity, e.g. `"claude"`.
    fn name(&self) -> &str;

    /// Binary invoked for this provider.
    fn binary(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    /// Provider-specific classification rules, consulted before the generic ones.
    fn error_patterns(&self) -> &PatternTable {
        &NO_PATTERNS
    }

    /// Whether the binary resolves on the search path.
    fn available(&self) -> bool;

    /// Run one prompt to completion.
    ///
    /// # Errors
    ///
    /// Returns a classified [`crate::error::RelayError`] on non-zero exit,
    /// timeout, missing binary or cancellation.
    async fn send_message(&self, prompt: &str, options: &SendOptions) -> Result<Response>;
}

/// Resolved, read-only settings for one configured provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: String,
    /// Registry key of the adapter driving this provider.
    pub adapter: String,
    pub enabled: bool,
    pub kind: ProviderKind,
    /// Lower is preferred.
    pub priority: i32,
    /// Preferred models; the first one is the default.
    pub models: Vec<String>,
    pub default_flags: Vec<String>,
    pub timeout: Duration,
    /// Overrides the adapter's default binary.
    pub binary: Option<String>,
    pub env: BTreeMap<String, String>,
    pub circuit_breaker: CircuitBreakerSettings,
    /// Appended to the adapter's built-in error patterns.
    pub extra_patterns: PatternTable,
}

impl ProviderSettings {
    /// Defaults for a provider driven by the adapter of the same name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            adapter: name.clone(),
            name,
            enabled: true,
            kind: ProviderKind::Subscription,
            priority: 100,
            models: Vec::new(),
            default_flags: Vec::new(),
            timeout: crate::core::executor::DEFAULT_TIMEOUT,
            binary: None,
            env: BTreeMap::new(),
            circuit_breaker: CircuitBreakerSettings::default(),
            extra_patterns: PatternTable::empty(),
        }
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub fn with_adapter(mut self, adapter: impl Into<String>) -> Self {
        self.adapter = adapter.into();
        self
    }

    #[must_use]
    pub fn with_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.models = models.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_circuit_breaker(mut self, settings: CircuitBreakerSettings) -> Self {
        self.circuit_breaker = settings;
        self
    }
}
