//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/relay/config.toml`
//! - macOS: `~/Library/Application Support/relay/config.toml`
//! - Windows: `%APPDATA%/relay/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `RELAY_PROVIDER`: Provider to try first
//! - `RELAY_TIMEOUT`: Per-attempt timeout in seconds
//! - `RELAY_MAX_ATTEMPTS`: Attempt budget across providers
//! - `RELAY_FORMAT`: Output format (human, json)
//! - `RELAY_CONFIG`: Override config file path

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::cli::args::{Cli, OutputFormat, SendArgs};
use crate::core::circuit_breaker::CircuitBreakerSettings;
use crate::core::classifier::{ErrorCategory, PatternTable};
use crate::core::conductor::RetryPolicy;
use crate::core::health::HealthSettings;
use crate::core::models::ProviderKind;
use crate::core::provider_manager::ManagerSettings;
use crate::error::{RelayError, Result};
use crate::providers::ProviderSettings;

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for the provider to try first.
pub const ENV_PROVIDER: &str = "RELAY_PROVIDER";
/// Environment variable for output format.
pub const ENV_FORMAT: &str = "RELAY_FORMAT";
/// Environment variable for the per-attempt timeout in seconds.
pub const ENV_TIMEOUT: &str = "RELAY_TIMEOUT";
/// Environment variable for the attempt budget.
pub const ENV_MAX_ATTEMPTS: &str = "RELAY_MAX_ATTEMPTS";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "RELAY_CONFIG";

/// Bounds for provider timeouts, in seconds.
const TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=3600;

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The validated config file (or defaults).
    pub config: Config,
    /// Provider to try first; `None` lets the manager pick.
    pub provider: Option<String>,
    /// Per-attempt timeout overriding every provider's own.
    pub timeout: Option<Duration>,
    /// Attempt budget; `None` derives it from the provider count.
    pub max_attempts: Option<usize>,
    /// Output format.
    pub format: OutputFormat,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub provider: ConfigSource,
    pub timeout: ConfigSource,
    pub max_attempts: ConfigSource,
    pub format: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Load the config file and merge it with CLI flags and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file is malformed or invalid, or an
    /// environment override cannot be parsed.
    pub fn resolve(cli: &Cli, send: Option<&SendArgs>) -> Result<Self> {
        let config = Config::load_from(&Config::config_path_for(cli.config.as_deref()))?;
        config.validate()?;
        Self::resolve_with(config, cli, send, |key| std::env::var(key).ok())
    }

    /// Merge an already-loaded config, reading the environment through `env`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] for unparsable overrides.
    pub fn resolve_with(
        config: Config,
        cli: &Cli,
        send: Option<&SendArgs>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut sources = ConfigSources::default();

        let provider = Self::resolve_provider(send, &config, &env, &mut sources.provider);
        let timeout = Self::resolve_timeout(send, &env, &mut sources.timeout)?;
        let max_attempts =
            Self::resolve_max_attempts(send, &config, &env, &mut sources.max_attempts)?;
        let format = Self::resolve_format(cli, &env, &mut sources.format)?;

        Ok(Self {
            config,
            provider,
            timeout,
            max_attempts,
            format,
            sources,
        })
    }

    fn resolve_provider(
        send: Option<&SendArgs>,
        config: &Config,
        env: &impl Fn(&str) -> Option<String>,
        source: &mut ConfigSource,
    ) -> Option<String> {
        // 1. CLI flag
        if let Some(name) = send.and_then(|args| args.provider.clone()) {
            *source = ConfigSource::Cli;
            return Some(name);
        }

        // 2. Environment variable
        if let Some(name) = env(ENV_PROVIDER).filter(|v| !v.trim().is_empty()) {
            *source = ConfigSource::Env;
            return Some(name.trim().to_string());
        }

        // 3. Config file
        if let Some(name) = &config.general.default_provider {
            *source = ConfigSource::ConfigFile;
            return Some(name.clone());
        }

        // 4. Default: highest-priority provider
        *source = ConfigSource::Default;
        None
    }

    fn resolve_timeout(
        send: Option<&SendArgs>,
        env: &impl Fn(&str) -> Option<String>,
        source: &mut ConfigSource,
    ) -> Result<Option<Duration>> {
        if let Some(seconds) = send.and_then(|args| args.timeout) {
            *source = ConfigSource::Cli;
            return Ok(Some(Duration::from_secs(seconds)));
        }

        if let Some(raw) = env(ENV_TIMEOUT) {
            let seconds = parse_env_number::<u64>(ENV_TIMEOUT, &raw)?;
            if !TIMEOUT_RANGE.contains(&seconds) {
                return Err(RelayError::ConfigInvalid {
                    key: ENV_TIMEOUT.to_string(),
                    message: "must be between 1 and 3600 seconds".to_string(),
                });
            }
            *source = ConfigSource::Env;
            return Ok(Some(Duration::from_secs(seconds)));
        }

        // Per-provider timeouts from the config file apply.
        *source = ConfigSource::ConfigFile;
        Ok(None)
    }

    fn resolve_max_attempts(
        send: Option<&SendArgs>,
        config: &Config,
        env: &impl Fn(&str) -> Option<String>,
        source: &mut ConfigSource,
    ) -> Result<Option<usize>> {
        if let Some(n) = send.and_then(|args| args.max_attempts) {
            *source = ConfigSource::Cli;
            return Ok(Some(n));
        }

        if let Some(raw) = env(ENV_MAX_ATTEMPTS) {
            let n = parse_env_number::<usize>(ENV_MAX_ATTEMPTS, &raw)?;
            if n == 0 {
                return Err(RelayError::ConfigInvalid {
                    key: ENV_MAX_ATTEMPTS.to_string(),
                    message: "must be at least 1".to_string(),
                });
            }
            *source = ConfigSource::Env;
            return Ok(Some(n));
        }

        if let Some(n) = config.general.max_attempts {
            *source = ConfigSource::ConfigFile;
            return Ok(Some(n));
        }

        *source = ConfigSource::Default;
        Ok(None)
    }

    fn resolve_format(
        cli: &Cli,
        env: &impl Fn(&str) -> Option<String>,
        source: &mut ConfigSource,
    ) -> Result<OutputFormat> {
        // 1. CLI --json flag (shorthand)
        if cli.json {
            *source = ConfigSource::Cli;
            return Ok(OutputFormat::Json);
        }

        // 2. Environment variable. clap fills in a default for --format, so
        // an explicit `--format human` cannot be told apart from no flag.
        if let Some(raw) = env(ENV_FORMAT) {
            *source = ConfigSource::Env;
            return Self::parse_format(&raw);
        }

        if cli.format != OutputFormat::Human {
            *source = ConfigSource::Cli;
            return Ok(cli.format);
        }

        *source = ConfigSource::Default;
        Ok(OutputFormat::Human)
    }

    /// Parse a format string into `OutputFormat`.
    fn parse_format(s: &str) -> Result<OutputFormat> {
        match s.trim().to_lowercase().as_str() {
            "human" => Ok(OutputFormat::Human),
            "json" => Ok(OutputFormat::Json),
            _ => Err(RelayError::ConfigInvalid {
                key: ENV_FORMAT.to_string(),
                message: format!("invalid format '{s}', expected human or json"),
            }),
        }
    }
}

fn parse_env_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| RelayError::ConfigInvalid {
        key: key.to_string(),
        message: format!("expected a number, got '{raw}'"),
    })
}

// =============================================================================
// Config file
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limit: RateLimitConfig,
    pub health: HealthConfig,
    /// Configured providers by name. A file that lists any provider
    /// replaces the built-in set.
    pub providers: BTreeMap<String, ProviderConfig>,
}

/// General orchestration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Provider tried first when none is requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,
    /// Tried in this order before the remaining providers.
    pub fallback_providers: Vec<String>,
    /// Attempt budget across providers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<usize>,
    /// Default log level (error, warn, info, debug, trace).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// Backoff between retries on the same provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential_base: f64,
    pub jitter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
    pub half_open_success_threshold: u32,
}

/// Per-provider circuit breaker overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub half_open_success_threshold: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Assumed limit window when the provider gives no reset hint.
    pub default_reset_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub threshold: f64,
    pub window: usize,
    pub min_samples: usize,
    pub slow_response_seconds: u64,
    pub max_age_seconds: u64,
}

/// Settings for one configured provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Adapter driving this provider; defaults to the provider name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter: Option<String>,
    pub enabled: bool,
    pub kind: ProviderKind,
    /// Lower is preferred.
    pub priority: i32,
    pub models: Vec<String>,
    pub default_flags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    /// Binary path or name overriding the adapter default.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    /// Extra environment for the CLI process.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker: Option<CircuitBreakerOverride>,
    /// Extra classification regexes keyed by category name.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub error_patterns: BTreeMap<String, Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            retry: RetryConfig::default(),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limit: RateLimitConfig::default(),
            health: HealthConfig::default(),
            providers: default_providers(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            exponential_base: 2.0,
            jitter: true,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        let defaults = CircuitBreakerSettings::default();
        Self {
            enabled: defaults.enabled,
            failure_threshold: defaults.failure_threshold,
            timeout_seconds: defaults.timeout.as_secs(),
            half_open_success_threshold: defaults.half_open_success_threshold,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_reset_seconds: crate::core::rate_limiter::DEFAULT_RESET.as_secs(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        let defaults = HealthSettings::default();
        Self {
            threshold: defaults.threshold,
            window: defaults.window,
            min_samples: defaults.min_samples,
            slow_response_seconds: defaults.slow_response.as_secs(),
            max_age_seconds: defaults.max_age.as_secs(),
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            adapter: None,
            enabled: true,
            kind: ProviderKind::default(),
            priority: 100,
            models: Vec::new(),
            default_flags: Vec::new(),
            timeout_seconds: None,
            binary: None,
            env: BTreeMap::new(),
            circuit_breaker: None,
            error_patterns: BTreeMap::new(),
        }
    }
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    [
        ("claude", 1, ProviderKind::Subscription),
        ("codex", 2, ProviderKind::UsageBased),
        ("cursor", 3, ProviderKind::Subscription),
        ("gemini", 4, ProviderKind::UsageBased),
    ]
    .into_iter()
    .map(|(name, priority, kind)| {
        (
            name.to_string(),
            ProviderConfig {
                priority,
                kind,
                ..ProviderConfig::default()
            },
        )
    })
    .collect()
}

impl Config {
    /// Load configuration from the default config file path.
    ///
    /// # Errors
    ///
    /// Returns an error only if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigParse`] if the file is not valid TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| RelayError::ConfigParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// Render as TOML.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if serialization fails.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| RelayError::Config(format!("Failed to serialize config: {e}")))
    }

    /// Config file path, honouring `RELAY_CONFIG`.
    #[must_use]
    pub fn config_path() -> PathBuf {
        Self::config_path_for(None)
    }

    /// Config file path: explicit path, then `RELAY_CONFIG`, then the default.
    #[must_use]
    pub fn config_path_for(explicit: Option<&Path>) -> PathBuf {
        explicit.map_or_else(
            || {
                std::env::var_os(ENV_CONFIG)
                    .map_or_else(|| AppPaths::new().config_file(), PathBuf::from)
            },
            Path::to_path_buf,
        )
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] naming the first offending key.
    pub fn validate(&self) -> Result<()> {
        if !self.providers.values().any(|p| p.enabled) {
            return Err(invalid("providers", "at least one provider must be enabled"));
        }

        if let Some(name) = &self.general.default_provider {
            match self.providers.get(name) {
                Some(p) if p.enabled => {}
                Some(_) => {
                    return Err(invalid(
                        "general.default_provider",
                        format!("provider '{name}' is disabled"),
                    ));
                }
                None => {
                    return Err(invalid(
                        "general.default_provider",
                        format!("unknown provider '{name}'"),
                    ));
                }
            }
        }

        for name in &self.general.fallback_providers {
            if !self.providers.contains_key(name) {
                return Err(invalid(
                    "general.fallback_providers",
                    format!("unknown provider '{name}'"),
                ));
            }
        }

        if self.general.max_attempts == Some(0) {
            return Err(invalid("general.max_attempts", "must be at least 1"));
        }

        if self.retry.exponential_base < 1.0 {
            return Err(invalid("retry.exponential_base", "must be at least 1.0"));
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return Err(invalid(
                "retry.max_delay_ms",
                "must not be smaller than base_delay_ms",
            ));
        }

        validate_breaker("circuit_breaker", &self.circuit_breaker.settings())?;

        if self.rate_limit.default_reset_seconds == 0 {
            return Err(invalid(
                "rate_limit.default_reset_seconds",
                "must be greater than 0",
            ));
        }

        if !(0.0..=100.0).contains(&self.health.threshold) {
            return Err(invalid("health.threshold", "must be between 0 and 100"));
        }
        if self.health.window == 0 {
            return Err(invalid("health.window", "must be greater than 0"));
        }

        for (name, provider) in &self.providers {
            if let Some(timeout) = provider.timeout_seconds
                && !TIMEOUT_RANGE.contains(&timeout)
            {
                return Err(invalid(
                    format!("providers.{name}.timeout_seconds"),
                    "must be between 1 and 3600 seconds",
                ));
            }
            validate_breaker(
                &format!("providers.{name}.circuit_breaker"),
                &self.breaker_for(provider),
            )?;
            provider.pattern_table(name)?;
        }

        Ok(())
    }

    /// Settings for every configured provider, enabled or not.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::ConfigInvalid`] for unknown categories or invalid
    /// regexes in `error_patterns`.
    pub fn provider_settings(&self) -> Result<Vec<ProviderSettings>> {
        self.providers
            .iter()
            .map(|(name, provider)| {
                let mut settings = ProviderSettings::new(name);
                if let Some(adapter) = &provider.adapter {
                    settings.adapter.clone_from(adapter);
                }
                settings.enabled = provider.enabled;
                settings.kind = provider.kind;
                settings.priority = provider.priority;
                settings.models.clone_from(&provider.models);
                settings.default_flags.clone_from(&provider.default_flags);
                if let Some(seconds) = provider.timeout_seconds {
                    settings.timeout = Duration::from_secs(seconds);
                }
                settings.binary.clone_from(&provider.binary);
                settings.env.clone_from(&provider.env);
                settings.circuit_breaker = self.breaker_for(provider);
                settings.extra_patterns = provider.pattern_table(name)?;
                Ok(settings)
            })
            .collect()
    }

    /// Manager-wide settings.
    #[must_use]
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            default_provider: self.general.default_provider.clone(),
            fallback_providers: self.general.fallback_providers.clone(),
            rate_limit_reset: Duration::from_secs(self.rate_limit.default_reset_seconds),
            health: HealthSettings {
                threshold: self.health.threshold,
                window: self.health.window,
                min_samples: self.health.min_samples,
                slow_response: Duration::from_secs(self.health.slow_response_seconds),
                max_age: Duration::from_secs(self.health.max_age_seconds),
            },
        }
    }

    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            exponential_base: self.retry.exponential_base,
            jitter: self.retry.jitter,
        }
    }

    fn breaker_for(&self, provider: &ProviderConfig) -> CircuitBreakerSettings {
        let base = self.circuit_breaker.settings();
        let Some(o) = &provider.circuit_breaker else {
            return base;
        };
        CircuitBreakerSettings {
            enabled: o.enabled.unwrap_or(base.enabled),
            failure_threshold: o.failure_threshold.unwrap_or(base.failure_threshold),
            timeout: o.timeout_seconds.map_or(base.timeout, Duration::from_secs),
            half_open_success_threshold: o
                .half_open_success_threshold
                .unwrap_or(base.half_open_success_threshold),
        }
    }
}

impl CircuitBreakerConfig {
    #[must_use]
    pub const fn settings(&self) -> CircuitBreakerSettings {
        CircuitBreakerSettings {
            enabled: self.enabled,
            failure_threshold: self.failure_threshold,
            timeout: Duration::from_secs(self.timeout_seconds),
            half_open_success_threshold: self.half_open_success_threshold,
        }
    }
}

impl ProviderConfig {
    /// Compile `error_patterns` into a table.
    fn pattern_table(&self, name: &str) -> Result<PatternTable> {
        let mut table = PatternTable::empty();
        for (category_name, patterns) in &self.error_patterns {
            let key = format!("providers.{name}.error_patterns.{category_name}");
            let category = ErrorCategory::from_name(category_name).ok_or_else(|| {
                let valid: Vec<&str> = ErrorCategory::ALL.iter().map(|c| c.as_str()).collect();
                invalid(&key, format!("unknown category, expected one of: {}", valid.join(", ")))
            })?;
            for pattern in patterns {
                table
                    .push(category, pattern)
                    .map_err(|(p, e)| invalid(&key, format!("invalid regex '{p}': {e}")))?;
            }
        }
        Ok(table)
    }
}

fn validate_breaker(key: &str, settings: &CircuitBreakerSettings) -> Result<()> {
    if settings.failure_threshold == 0 {
        return Err(invalid(
            format!("{key}.failure_threshold"),
            "must be greater than 0",
        ));
    }
    if settings.half_open_success_threshold == 0 {
        return Err(invalid(
            format!("{key}.half_open_success_threshold"),
            "must be greater than 0",
        ));
    }
    if settings.timeout.is_zero() {
        return Err(invalid(format!("{key}.timeout_seconds"), "must be greater than 0"));
    }
    Ok(())
}

fn invalid(key: impl AsRef<str>, message: impl Into<String>) -> RelayError {
    RelayError::ConfigInvalid {
        key: key.as_ref().to_string(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;
    use crate::test_utils::make_test_config_toml;

    fn parse(toml_str: &str) -> Config {
        toml::from_str(toml_str).unwrap()
    }

    fn make_test_cli() -> Cli {
        Cli {
            command: None,
            format: OutputFormat::Human,
            json: false,
            pretty: false,
            no_color: false,
            log_level: None,
            json_output: false,
            verbose: false,
            config: None,
        }
    }

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn no_env() -> impl Fn(&str) -> Option<String> {
        env_from(&[])
    }

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.providers.keys().collect::<Vec<_>>(),
            vec!["claude", "codex", "cursor", "gemini"]
        );
        assert_eq!(config.providers["claude"].priority, 1);
        assert_eq!(config.providers["codex"].kind, ProviderKind::UsageBased);
    }

    #[test]
    fn load_missing_file_returns_default() {
        let config = Config::load_from(Path::new("/nonexistent/path/config.toml")).unwrap();
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
    }

    #[test]
    fn load_full_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", make_test_config_toml()).unwrap();

        let config = Config::load_from(file.path()).unwrap();
        config.validate().unwrap();
        assert_eq!(config.general.default_provider.as_deref(), Some("claude"));
        assert_eq!(config.general.fallback_providers, vec!["codex"]);
        assert_eq!(config.general.max_attempts, Some(3));
        assert_eq!(config.retry.base_delay_ms, 10);
        assert!(!config.retry.jitter);
        assert_eq!(config.rate_limit.default_reset_seconds, 90);
        assert_eq!(config.health.max_age_seconds, 300);
        assert_eq!(config.providers.len(), 3);
        assert_eq!(config.providers["claude"].models, vec!["sonnet", "opus"]);
        assert!(!config.providers["work"].enabled);
    }

    #[test]
    fn load_invalid_toml_is_parse_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "this is not valid toml {{{{").unwrap();

        let err = Config::load_from(file.path()).unwrap_err();
        assert!(matches!(err, RelayError::ConfigParse { .. }));
        assert_eq!(err.exit_code(), crate::error::ExitCode::ConfigError);
    }

    #[test]
    fn rendered_toml_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = parse(&make_test_config_toml());
        config.retry.max_delay_ms = 250;
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.retry.max_delay_ms, 250);
        assert_eq!(loaded.providers.len(), 3);
        assert_eq!(
            loaded.providers["work"].env.get("CLAUDE_CONFIG_DIR").map(String::as_str),
            Some("/home/me/.claude-work")
        );
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn partial_config_uses_defaults() {
        let config = parse(
            r#"
[general]
default_provider = "codex"
"#,
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.providers.len(), 4);
        assert_eq!(config.retry.max_delay_ms, 30_000);
        assert!((config.health.threshold - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let config = parse(
            r"
[general]
colour = 'purple'

[mystery]
value = 1
",
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn provider_settings_resolve_overrides() {
        let config = parse(&make_test_config_toml());
        let settings = config.provider_settings().unwrap();
        let by_name = |name: &str| settings.iter().find(|s| s.name == name).unwrap();

        let claude = by_name("claude");
        assert_eq!(claude.adapter, "claude");
        assert_eq!(claude.timeout, Duration::from_secs(600));
        assert_eq!(claude.circuit_breaker.failure_threshold, 3);

        let codex = by_name("codex");
        assert_eq!(codex.circuit_breaker.failure_threshold, 1);
        assert_eq!(codex.circuit_breaker.timeout, Duration::from_secs(30));
        assert_eq!(codex.default_flags, vec!["--skip-git-repo-check"]);
        assert_eq!(codex.extra_patterns.patterns(ErrorCategory::Transient).len(), 1);

        let work = by_name("work");
        assert_eq!(work.adapter, "anthropic");
        assert!(!work.enabled);
        assert_eq!(work.binary.as_deref(), Some("/opt/claude/bin/claude"));
    }

    #[test]
    fn manager_settings_and_retry_policy() {
        let config = parse(&make_test_config_toml());
        let manager = config.manager_settings();
        assert_eq!(manager.default_provider.as_deref(), Some("claude"));
        assert_eq!(manager.rate_limit_reset, Duration::from_secs(90));
        assert_eq!(manager.health.min_samples, 3);
        assert_eq!(manager.health.max_age, Duration::from_secs(300));

        let retry = config.retry_policy();
        assert_eq!(retry.base_delay, Duration::from_millis(10));
        assert_eq!(retry.max_delay, Duration::from_millis(100));
        assert!(!retry.jitter);
    }

    #[test]
    fn validate_rejects_disabled_default_provider() {
        let mut config = Config::default();
        config.general.default_provider = Some("claude".to_string());
        config.providers.get_mut("claude").unwrap().enabled = false;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RelayError::ConfigInvalid { ref key, .. } if key == "general.default_provider"));
    }

    #[test]
    fn validate_rejects_unknown_default_and_fallback() {
        let mut config = Config::default();
        config.general.default_provider = Some("copilot".to_string());
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.general.fallback_providers = vec!["copilot".to_string()];
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("copilot"), "{err}");
    }

    #[test]
    fn validate_rejects_zero_thresholds() {
        let mut config = Config::default();
        config.circuit_breaker.failure_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.providers.get_mut("codex").unwrap().circuit_breaker =
            Some(CircuitBreakerOverride {
                half_open_success_threshold: Some(0),
                ..CircuitBreakerOverride::default()
            });
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, RelayError::ConfigInvalid { ref key, .. } if key == "providers.codex.circuit_breaker.half_open_success_threshold")
        );
    }

    #[test]
    fn validate_timeout_bounds() {
        for (timeout, ok) in [(0, false), (1, true), (3600, true), (3601, false)] {
            let mut config = Config::default();
            config.providers.get_mut("gemini").unwrap().timeout_seconds = Some(timeout);
            assert_eq!(config.validate().is_ok(), ok, "timeout {timeout}");
        }
    }

    #[test]
    fn validate_rejects_bad_patterns() {
        let mut config = Config::default();
        config
            .providers
            .get_mut("claude")
            .unwrap()
            .error_patterns
            .insert("transient".to_string(), vec!["(unclosed".to_string()]);
        assert!(config.validate().unwrap_err().to_string().contains("invalid regex"));

        let mut config = Config::default();
        config
            .providers
            .get_mut("claude")
            .unwrap()
            .error_patterns
            .insert("flaky".to_string(), vec!["x".to_string()]);
        assert!(config.validate().unwrap_err().to_string().contains("unknown category"));
    }

    #[test]
    fn validate_requires_an_enabled_provider() {
        let mut config = Config::default();
        for provider in config.providers.values_mut() {
            provider.enabled = false;
        }
        assert!(config.validate().is_err());
    }

    // -------------------------------------------------------------------------
    // ResolvedConfig tests
    // -------------------------------------------------------------------------

    #[test]
    fn config_source_display() {
        assert_eq!(format!("{}", ConfigSource::Cli), "CLI flag");
        assert_eq!(format!("{}", ConfigSource::Env), "environment variable");
        assert_eq!(format!("{}", ConfigSource::ConfigFile), "config file");
        assert_eq!(format!("{}", ConfigSource::Default), "default");
    }

    #[test]
    fn resolved_defaults() {
        let resolved =
            ResolvedConfig::resolve_with(Config::default(), &make_test_cli(), None, no_env())
                .unwrap();
        assert_eq!(resolved.provider, None);
        assert_eq!(resolved.sources.provider, ConfigSource::Default);
        assert_eq!(resolved.timeout, None);
        assert_eq!(resolved.max_attempts, None);
        assert_eq!(resolved.format, OutputFormat::Human);
    }

    #[test]
    fn cli_beats_env_beats_file() {
        let config = parse(&make_test_config_toml());
        let env = env_from(&[
            (ENV_PROVIDER, "codex"),
            (ENV_TIMEOUT, "45"),
            (ENV_MAX_ATTEMPTS, "7"),
        ]);
        let send = SendArgs {
            provider: Some("gemini".to_string()),
            ..SendArgs::default()
        };

        let resolved =
            ResolvedConfig::resolve_with(config.clone(), &make_test_cli(), Some(&send), &env)
                .unwrap();
        assert_eq!(resolved.provider.as_deref(), Some("gemini"));
        assert_eq!(resolved.sources.provider, ConfigSource::Cli);
        assert_eq!(resolved.timeout, Some(Duration::from_secs(45)));
        assert_eq!(resolved.sources.timeout, ConfigSource::Env);
        assert_eq!(resolved.max_attempts, Some(7));
        assert_eq!(resolved.sources.max_attempts, ConfigSource::Env);

        let resolved =
            ResolvedConfig::resolve_with(config.clone(), &make_test_cli(), None, &env).unwrap();
        assert_eq!(resolved.provider.as_deref(), Some("codex"));
        assert_eq!(resolved.sources.provider, ConfigSource::Env);

        let resolved =
            ResolvedConfig::resolve_with(config, &make_test_cli(), None, no_env()).unwrap();
        assert_eq!(resolved.provider.as_deref(), Some("claude"));
        assert_eq!(resolved.sources.provider, ConfigSource::ConfigFile);
        assert_eq!(resolved.max_attempts, Some(3));
        assert_eq!(resolved.sources.max_attempts, ConfigSource::ConfigFile);
    }

    #[test]
    fn format_resolution() {
        let mut cli = make_test_cli();
        cli.json = true;
        let resolved = ResolvedConfig::resolve_with(
            Config::default(),
            &cli,
            None,
            env_from(&[(ENV_FORMAT, "human")]),
        )
        .unwrap();
        assert_eq!(resolved.format, OutputFormat::Json);
        assert_eq!(resolved.sources.format, ConfigSource::Cli);

        let resolved = ResolvedConfig::resolve_with(
            Config::default(),
            &make_test_cli(),
            None,
            env_from(&[(ENV_FORMAT, "JSON")]),
        )
        .unwrap();
        assert_eq!(resolved.format, OutputFormat::Json);
        assert_eq!(resolved.sources.format, ConfigSource::Env);
    }

    #[test]
    fn bad_env_values_are_config_errors() {
        for (key, value) in [
            (ENV_TIMEOUT, "soon"),
            (ENV_TIMEOUT, "0"),
            (ENV_MAX_ATTEMPTS, "0"),
            (ENV_FORMAT, "md"),
        ] {
            let err = ResolvedConfig::resolve_with(
                Config::default(),
                &make_test_cli(),
                None,
                env_from(&[(key, value)]),
            )
            .unwrap_err();
            assert!(
                matches!(err, RelayError::ConfigInvalid { key: ref k, .. } if k == key),
                "{key}={value}: {err}"
            );
        }
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = Path::new("/tmp/relay-test/config.toml");
        assert_eq!(Config::config_path_for(Some(path)), path);
    }
}
