//! Error types for relay.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! Errors are grouped into five classes:
//! - **Provider**: a provider CLI ran and failed (classified), timed out or
//!   rejected the request as rate limited / unauthenticated
//! - **Orchestration**: open circuits, exhausted fallback chains, cancellation
//! - **Configuration**: config file parsing, validation, unknown providers
//! - **Environment**: missing agent CLI binaries
//! - **Internal**: I/O, JSON and unexpected errors
//!
//! Each error has a stable error code (e.g., `RELAY-P001`) for programmatic handling.
//!
//! Provider failures additionally carry an [`ErrorCategory`] from the
//! classifier; that category, not the variant, drives failover decisions.

pub mod suggestions;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::core::classifier::{self, ErrorCategory, PatternTable};

pub use suggestions::FixSuggestion;

// =============================================================================
// Error Classes
// =============================================================================

/// High-level error classes used for error codes and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A provider CLI failed.
    Provider,
    /// Failover machinery gave up or was interrupted.
    Orchestration,
    /// Config file or flag problems.
    Configuration,
    /// Missing tools on this machine.
    Environment,
    /// Bugs and unclassified errors.
    Internal,
}

impl ErrorClass {
    /// Returns a human-readable description of the class.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Provider => "Provider error",
            Self::Orchestration => "Orchestration error",
            Self::Configuration => "Configuration error",
            Self::Environment => "Environment error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this class.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Provider => "P",
            Self::Orchestration => "O",
            Self::Configuration => "C",
            Self::Environment => "E",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes for the `relay` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Provider failure or unexpected error
    GeneralError = 1,
    /// Agent CLI binary not found
    BinaryNotFound = 2,
    /// Configuration or unknown provider
    ConfigError = 3,
    /// Timeout
    Timeout = 4,
    /// Every provider failed or was unavailable
    NoProviders = 5,
    /// Interrupted (SIGINT convention)
    Cancelled = 130,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

// =============================================================================
// Attempt history
// =============================================================================

/// One failed attempt recorded while walking the fallback chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderAttempt {
    pub provider: String,
    /// Classified category, absent for unavailability reasons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<ErrorCategory>,
    pub message: String,
}

impl ProviderAttempt {
    #[must_use]
    pub fn new(
        provider: impl Into<String>,
        category: Option<ErrorCategory>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            category,
            message: message.into(),
        }
    }
}

fn describe_attempts(attempts: &[ProviderAttempt]) -> String {
    if attempts.is_empty() {
        return "no providers configured or enabled".to_string();
    }
    attempts
        .iter()
        .map(|a| match a.category {
            Some(category) => format!("{} [{}]: {}", a.provider, category, a.message),
            None => format!("{}: {}", a.provider, a.message),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// Main error type for relay operations.
///
/// Each variant has:
/// - A stable error code (e.g., `RELAY-P001`)
/// - A class for rendering
/// - A retryable flag consistent with its classified category
#[derive(Error, Debug)]
pub enum RelayError {
    // ==========================================================================
    // Provider errors (Class: Provider)
    // ==========================================================================
    /// A provider CLI failed with a classified error.
    #[error("{provider} failed ({category}): {message}")]
    Provider {
        provider: String,
        category: ErrorCategory,
        message: String,
        exit_code: Option<i32>,
    },

    /// A provider CLI exceeded its timeout and was killed.
    #[error("{provider} timed out after {seconds}s")]
    Timeout { provider: String, seconds: u64 },

    /// A provider reported a rate limit.
    #[error("{provider} is rate limited: {message}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
        message: String,
    },

    /// A provider rejected its credentials.
    #[error("{provider} authentication failed: {message}")]
    Authentication { provider: String, message: String },

    // ==========================================================================
    // Orchestration errors (Class: Orchestration)
    // ==========================================================================
    /// The provider's circuit breaker is open.
    #[error("circuit breaker open for {provider}")]
    CircuitOpen { provider: String },

    /// The fallback chain is exhausted.
    #[error("no providers available: {}", describe_attempts(.attempts))]
    NoProvidersAvailable {
        attempts: Vec<ProviderAttempt>,
        earliest_reset: Option<DateTime<Utc>>,
    },

    /// The request was cancelled by the caller.
    #[error("request cancelled")]
    Cancelled,

    /// A non-recoverable failure after earlier attempts had already failed.
    ///
    /// `attempts` holds every attempt of the request, the escalated one last.
    #[error("{cause} [attempts: {}]", describe_attempts(.attempts))]
    Escalated {
        attempts: Vec<ProviderAttempt>,
        #[source]
        cause: Box<RelayError>,
    },

    // ==========================================================================
    // Configuration errors (Class: Configuration)
    // ==========================================================================
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to parse config at {path}: {message}")]
    ConfigParse { path: String, message: String },

    #[error("invalid config value for {key}: {message}")]
    ConfigInvalid { key: String, message: String },

    #[error("unknown provider: {0}")]
    InvalidProvider(String),

    // ==========================================================================
    // Environment errors (Class: Environment)
    // ==========================================================================
    #[error("{binary} not found in PATH (provider {provider})")]
    CliNotFound { provider: String, binary: String },

    // ==========================================================================
    // Internal errors (Class: Internal)
    // ==========================================================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RelayError {
    /// Map error to the binary's exit code.
    ///
    /// Escalated errors exit with their cause's code.
    #[must_use]
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Escalated { cause, .. } => cause.exit_code(),

            Self::CliNotFound { .. } => ExitCode::BinaryNotFound,

            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::InvalidProvider(_) => ExitCode::ConfigError,

            Self::Timeout { .. } => ExitCode::Timeout,

            Self::NoProvidersAvailable { .. } | Self::CircuitOpen { .. } => {
                ExitCode::NoProviders
            }

            Self::Cancelled => ExitCode::Cancelled,

            Self::Provider { .. }
            | Self::RateLimited { .. }
            | Self::Authentication { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error class.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Provider { .. }
            | Self::Timeout { .. }
            | Self::RateLimited { .. }
            | Self::Authentication { .. } => ErrorClass::Provider,

            Self::CircuitOpen { .. }
            | Self::NoProvidersAvailable { .. }
            | Self::Cancelled
            | Self::Escalated { .. } => ErrorClass::Orchestration,

            Self::Config(_)
            | Self::ConfigParse { .. }
            | Self::ConfigInvalid { .. }
            | Self::InvalidProvider(_) => ErrorClass::Configuration,

            Self::CliNotFound { .. } => ErrorClass::Environment,

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorClass::Internal,
        }
    }

    /// Returns a stable error code for programmatic handling.
    ///
    /// Format: `RELAY-{class}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Provider { .. } => "RELAY-P001",
            Self::Timeout { .. } => "RELAY-P002",
            Self::RateLimited { .. } => "RELAY-P003",
            Self::Authentication { .. } => "RELAY-P004",

            Self::CircuitOpen { .. } => "RELAY-O001",
            Self::NoProvidersAvailable { .. } => "RELAY-O002",
            Self::Cancelled => "RELAY-O003",
            Self::Escalated { .. } => "RELAY-O004",

            Self::Config(_) => "RELAY-C001",
            Self::ConfigParse { .. } => "RELAY-C002",
            Self::ConfigInvalid { .. } => "RELAY-C003",
            Self::InvalidProvider(_) => "RELAY-C010",

            Self::CliNotFound { .. } => "RELAY-E001",

            Self::Io(_) => "RELAY-X001",
            Self::Json(_) => "RELAY-X002",
            Self::Other(_) => "RELAY-X099",
        }
    }

    /// Classified failure category, when the error came from a provider.
    #[must_use]
    pub fn category(&self) -> Option<ErrorCategory> {
        match self {
            Self::Escalated { cause, .. } => cause.category(),
            Self::Provider { category, .. } => Some(*category),
            Self::Timeout { .. } => Some(ErrorCategory::Timeout),
            Self::RateLimited { .. } => Some(ErrorCategory::RateLimited),
            Self::Authentication { .. } => Some(ErrorCategory::AuthExpired),
            _ => None,
        }
    }

    /// Whether retrying the same provider may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self.category() {
            Some(category) => category.is_retryable(),
            None => false,
        }
    }

    /// Returns the retry-after duration if this error specifies one.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Returns the provider name if this error is provider-specific.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Provider { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::RateLimited { provider, .. }
            | Self::Authentication { provider, .. }
            | Self::CircuitOpen { provider }
            | Self::CliNotFound { provider, .. } => Some(provider),
            Self::InvalidProvider(p) => Some(p),
            Self::Escalated { cause, .. } => cause.provider(),
            _ => None,
        }
    }

    /// Recorded attempt history, for exhaustion and escalation errors.
    #[must_use]
    pub fn attempts(&self) -> &[ProviderAttempt] {
        match self {
            Self::NoProvidersAvailable { attempts, .. } | Self::Escalated { attempts, .. } => {
                attempts.as_slice()
            }
            _ => &[],
        }
    }

    /// Providers attempted during the request, in order, deduplicated.
    #[must_use]
    pub fn attempted_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for attempt in self.attempts() {
            if !names.contains(&attempt.provider) {
                names.push(attempt.provider.clone());
            }
        }
        names
    }

    /// Returns actionable fix suggestions for this error.
    ///
    /// # Example
    ///
    /// ```
    /// use relay::error::RelayError;
    ///
    /// let err = RelayError::CliNotFound {
    ///     provider: "claude".to_string(),
    ///     binary: "claude".to_string(),
    /// };
    /// for cmd in &err.fix_suggestions()[0].commands {
    ///     println!("  {}", cmd);
    /// }
    /// ```
    #[must_use]
    pub fn fix_suggestions(&self) -> Vec<FixSuggestion> {
        match self {
            Self::Provider {
                provider,
                category,
                message,
                ..
            } => suggestions::provider_failure_suggestions(provider, *category, message),
            Self::Timeout { provider, seconds } => {
                suggestions::timeout_suggestions(provider, *seconds)
            }
            Self::RateLimited {
                provider,
                retry_after,
                message,
            } => suggestions::rate_limited_suggestions(provider, *retry_after, message),
            Self::Authentication { provider, message } => {
                suggestions::authentication_suggestions(provider, message)
            }

            Self::CircuitOpen { provider } => suggestions::circuit_open_suggestions(provider),
            Self::NoProvidersAvailable { earliest_reset, .. } => {
                suggestions::no_providers_suggestions(&self.attempted_providers(), *earliest_reset)
            }
            Self::Cancelled => Vec::new(),
            Self::Escalated { cause, .. } => cause.fix_suggestions(),

            Self::Config(msg) => vec![FixSuggestion::new(
                vec!["relay config --path".to_string()],
                format!("Configuration error: {msg}"),
            )],
            Self::ConfigParse { path, message } => {
                suggestions::config_parse_suggestions(path, message)
            }
            Self::ConfigInvalid { key, message } => {
                suggestions::config_invalid_suggestions(key, message)
            }
            Self::InvalidProvider(name) => suggestions::invalid_provider_suggestions(name),

            Self::CliNotFound { provider, binary } => {
                suggestions::cli_not_found_suggestions(provider, binary)
            }

            Self::Io(err) => vec![FixSuggestion::new(
                vec!["# Check file permissions and disk space".to_string()],
                format!("I/O error: {err}."),
            )],
            Self::Json(err) => vec![FixSuggestion::new(
                vec!["relay -v send \"...\"".to_string()],
                format!("JSON error: {err}. A provider CLI may have changed its output format."),
            )],
            Self::Other(err) => vec![FixSuggestion::new(
                vec!["relay -v send \"...\"".to_string()],
                format!("Unexpected error: {err}. Please report this issue."),
            )],
        }
    }
}

/// Build the error for a failed provider invocation from its output text.
///
/// The category comes from [`classifier::classify`]; rate limits carry any
/// retry hint found in the message.
#[must_use]
pub fn classified_error(
    provider: &str,
    message: &str,
    patterns: &PatternTable,
    exit_code: Option<i32>,
) -> RelayError {
    let message = message.trim().to_string();
    match classifier::classify(&message, patterns) {
        ErrorCategory::RateLimited => RelayError::RateLimited {
            provider: provider.to_string(),
            retry_after: classifier::parse_retry_after(&message),
            message,
        },
        ErrorCategory::AuthExpired => RelayError::Authentication {
            provider: provider.to_string(),
            message,
        },
        category => RelayError::Provider {
            provider: provider.to_string(),
            category,
            message,
            exit_code,
        },
    }
}

/// Result type alias for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

// =============================================================================
// Tests
// =============================================================================
