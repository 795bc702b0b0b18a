//! Core data models shared by providers, the manager and the conductor.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

// =============================================================================
// Provider kind
// =============================================================================

/// Billing model of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Flat-rate plan with usage windows.
    #[default]
    Subscription,
    /// Pay per token.
    UsageBased,
}

impl ProviderKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Subscription => "subscription",
            Self::UsageBased => "usage_based",
        }
    }
}

// =============================================================================
// Capabilities
// =============================================================================

/// Static feature flags of an agent CLI.
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Capabilities {
    pub streaming: bool,
    pub mcp: bool,
    pub dangerous_mode: bool,
    pub vision: bool,
    pub tool_use: bool,
    pub session_resume: bool,
}

impl Capabilities {
    /// Names of the enabled capabilities, for display.
    #[must_use]
    pub fn enabled(&self) -> Vec<&'static str> {
        [
            (self.streaming, "streaming"),
            (self.mcp, "mcp"),
            (self.dangerous_mode, "dangerous-mode"),
            (self.vision, "vision"),
            (self.tool_use, "tool-use"),
            (self.session_resume, "session-resume"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect()
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Per-request options passed to a provider.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Model override; `None` uses the provider's first configured model.
    pub model: Option<String>,
    /// Timeout override; `None` uses the provider's configured timeout.
    pub timeout: Option<Duration>,
    /// Skip the CLI's permission prompts.
    pub dangerous_mode: bool,
    /// Resume an existing CLI session.
    pub session: Option<String>,
    pub cancel: CancellationToken,
}

// =============================================================================
// Responses
// =============================================================================

/// Token counts reported by a CLI.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    #[must_use]
    pub const fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// Normalized result of one successful provider call.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub output: String,
    pub exit_code: i32,
    #[serde(with = "duration_ms", rename = "durationMs")]
    pub duration: Duration,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// Structured error text the CLI reported alongside a zero exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_usd: Option<f64>,
}

impl Response {
    #[must_use]
    pub fn new(provider: impl Into<String>, output: impl Into<String>, duration: Duration) -> Self {
        Self {
            output: output.into(),
            exit_code: 0,
            duration,
            provider: provider.into(),
            model: None,
            usage: None,
            error: None,
            session_id: None,
            cost_usd: None,
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    #[must_use]
    pub const fn with_usage(mut self, usage: Option<TokenUsage>) -> Self {
        self.usage = usage;
        self
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_total() {
        let usage = TokenUsage::new(120, 30);
        assert_eq!(usage.total_tokens, 150);
    }

    #[test]
    fn capabilities_enabled_names() {
        let caps = Capabilities {
            streaming: true,
            session_resume: true,
            ..Capabilities::default()
        };
        assert_eq!(caps.enabled(), vec!["streaming", "session-resume"]);
    }

    #[test]
    fn response_serializes_camel_case() {
        let response = Response::new("claude", "hi", Duration::from_millis(1500))
            .with_model(Some("sonnet".to_string()))
            .with_usage(Some(TokenUsage::new(1, 2)));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["durationMs"], 1500);
        assert_eq!(json["usage"]["totalTokens"], 3);
        assert_eq!(json["model"], "sonnet");
        assert!(json.get("sessionId").is_none());
    }

    #[test]
    fn provider_kind_names() {
        assert_eq!(ProviderKind::UsageBased.as_str(), "usage_based");
        let kind: ProviderKind = serde_json::from_str("\"usage_based\"").unwrap();
        assert_eq!(kind, ProviderKind::UsageBased);
    }
}
