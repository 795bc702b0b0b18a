//! Error classification for provider failures.
//!
//! Maps raw failure text from an agent CLI onto a closed set of categories.
//! Each category carries the recovery action the conductor takes:
//! switch to another provider, retry the same provider after a backoff, or
//! escalate to the caller.
//!
//! Provider-specific tables are consulted first, in category declaration
//! order; the generic table below is the fallback for every provider.

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

// =============================================================================
// Error Category
// =============================================================================

/// Classified failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimited,
    AuthExpired,
    QuotaExceeded,
    Timeout,
    Transient,
    Permanent,
    Unknown,
}

/// What the conductor should do after a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Move the request to the next provider in the fallback chain.
    SwitchProvider,
    /// Back off, then try the same provider again.
    RetryWithBackoff,
    /// Stop and surface the error.
    Escalate,
}

impl ErrorCategory {
    /// All categories in declaration (and matching) order.
    pub const ALL: &'static [Self] = &[
        Self::RateLimited,
        Self::AuthExpired,
        Self::QuotaExceeded,
        Self::Timeout,
        Self::Transient,
        Self::Permanent,
        Self::Unknown,
    ];

    /// Stable snake_case name, also used as the config key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AuthExpired => "auth_expired",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Timeout => "timeout",
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a snake_case category name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == name.trim().to_lowercase())
    }

    /// Recommended recovery action.
    #[must_use]
    pub const fn action(self) -> RecoveryAction {
        match self {
            Self::RateLimited | Self::AuthExpired | Self::QuotaExceeded => {
                RecoveryAction::SwitchProvider
            }
            Self::Timeout | Self::Transient => RecoveryAction::RetryWithBackoff,
            Self::Permanent | Self::Unknown => RecoveryAction::Escalate,
        }
    }

    /// Whether retrying the same provider can help.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self.action(), RecoveryAction::RetryWithBackoff)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Pattern Table
// =============================================================================

/// Ordered category → regex rules for one provider.
///
/// Tables are built once (usually behind a `LazyLock`) and never mutated.
#[derive(Debug, Clone, Default)]
pub struct PatternTable {
    rules: Vec<(ErrorCategory, Vec<Regex>)>,
}

impl PatternTable {
    /// A table with no rules; classification falls through to the generic table.
    #[must_use]
    pub const fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Compile a table from string patterns (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns the first invalid pattern and its compile error.
    pub fn from_patterns(
        rules: &[(ErrorCategory, &[&str])],
    ) -> Result<Self, (String, regex::Error)> {
        let mut table = Self::empty();
        for (category, patterns) in rules {
            for pattern in *patterns {
                table.push(*category, pattern)?;
            }
        }
        Ok(table)
    }

    /// Append one pattern under a category.
    ///
    /// # Errors
    ///
    /// Returns the pattern and the compile error if it is not a valid regex.
    pub fn push(
        &mut self,
        category: ErrorCategory,
        pattern: &str,
    ) -> Result<(), (String, regex::Error)> {
        let regex = compile(pattern).map_err(|e| (pattern.to_string(), e))?;
        if let Some((_, regexes)) = self.rules.iter_mut().find(|(c, _)| *c == category) {
            regexes.push(regex);
        } else {
            self.rules.push((category, vec![regex]));
        }
        Ok(())
    }

    /// Combine two tables; rules from `other` are appended per category.
    #[must_use]
    pub fn merged(&self, other: &Self) -> Self {
        let mut merged = self.clone();
        for (category, regexes) in &other.rules {
            if let Some((_, existing)) = merged.rules.iter_mut().find(|(c, _)| c == category) {
                existing.extend(regexes.iter().cloned());
            } else {
                merged.rules.push((*category, regexes.clone()));
            }
        }
        merged
    }

    /// Patterns registered for a category.
    #[must_use]
    pub fn patterns(&self, category: ErrorCategory) -> &[Regex] {
        self.rules
            .iter()
            .find(|(c, _)| *c == category)
            .map_or(&[], |(_, regexes)| regexes.as_slice())
    }

    /// First category (in declaration order) with a matching pattern.
    #[must_use]
    pub fn matching(&self, message: &str) -> Option<ErrorCategory> {
        ErrorCategory::ALL
            .iter()
            .copied()
            .find(|category| self.patterns(*category).iter().any(|re| re.is_match(message)))
    }

    /// Whether the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.iter().all(|(_, regexes)| regexes.is_empty())
    }
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Generic fallback rules applied after the provider table.
static GENERIC_PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    PatternTable::from_patterns(&[
        (
            ErrorCategory::RateLimited,
            &[r"rate[\s_-]?limit", r"\brate\b", r"too many requests", r"\b429\b"],
        ),
        (ErrorCategory::QuotaExceeded, &[r"quota", r"billing"]),
        (
            ErrorCategory::AuthExpired,
            &[r"\bauth", r"unauthori[sz]ed", r"\b401\b", r"\b403\b"],
        ),
        (ErrorCategory::Timeout, &[r"time[sd]?[\s_-]?out"]),
        (ErrorCategory::Transient, &[r"\b5\d\d\b", r"temporar"]),
        (ErrorCategory::Permanent, &[r"invalid", r"malformed", r"\b400\b"]),
    ])
    .unwrap()
});

// =============================================================================
// Classification
// =============================================================================

/// Classify a failure message.
///
/// Provider patterns win over the generic table; anything unmatched is
/// [`ErrorCategory::Unknown`]. Pure and deterministic.
#[must_use]
pub fn classify(message: &str, provider_patterns: &PatternTable) -> ErrorCategory {
    provider_patterns
        .matching(message)
        .or_else(|| GENERIC_PATTERNS.matching(message))
        .unwrap_or(ErrorCategory::Unknown)
}

static RETRY_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:retry|try again|resets?|available)\s+(?:after|in)\s+(\d+)\s*(seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h)?\b",
    )
    .unwrap()
});

/// Extract a retry-after hint such as "try again in 30 seconds" or "resets in 2h".
///
/// A bare number is read as seconds.
#[must_use]
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let captures = RETRY_HINT.captures(message)?;
    let amount: u64 = captures.get(1)?.as_str().parse().ok()?;
    let unit = captures
        .get(2)
        .map_or("s", |m| m.as_str())
        .to_lowercase();

    let seconds = match unit.chars().next() {
        Some('m') => amount.saturating_mul(60),
        Some('h') => amount.saturating_mul(3600),
        _ => amount,
    };
    Some(Duration::from_secs(seconds))
}
