//! Robot-mode output (JSON).
//!
//! Every command wraps its data in the same envelope so agents can parse
//! output without knowing which command produced it.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

/// Schema identifier for the JSON envelope.
pub const SCHEMA_VERSION: &str = "relay.v1";

/// Top-level JSON envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RobotOutput<T> {
    pub schema_version: &'static str,
    pub generated_at: DateTime<Utc>,
    pub command: String,
    pub data: T,
}

impl<T> RobotOutput<T> {
    /// Create a new robot output envelope.
    pub fn new(command: impl Into<String>, data: T) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            generated_at: Utc::now(),
            command: command.into(),
            data,
        }
    }
}

/// Render `data` inside the envelope.
///
/// # Errors
///
/// Returns an error if `data` fails to serialize.
pub fn render_json<T: Serialize>(command: &str, data: &T, pretty: bool) -> Result<String> {
    let output = RobotOutput::new(command, data);
    Ok(if pretty {
        serde_json::to_string_pretty(&output)?
    } else {
        serde_json::to_string(&output)?
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_fields() {
        let json = render_json("send", &serde_json::json!({"output": "hi"}), false).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["schemaVersion"], SCHEMA_VERSION);
        assert_eq!(parsed["command"], "send");
        assert_eq!(parsed["data"]["output"], "hi");
        assert!(parsed["generatedAt"].is_string());
    }

    #[test]
    fn pretty_is_indented() {
        let json = render_json("providers", &vec![1, 2], true).unwrap();
        assert!(json.contains("\n  "));
    }
}
