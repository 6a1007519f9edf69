//! Tool trait and types.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::context::TurnContext;
use crate::llm::ToolDefinition;

/// Error type for tool execution.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("External service error: {0}")]
    ExternalService(String),
}

impl From<std::io::Error> for ToolError {
    fn from(err: std::io::Error) -> Self {
        ToolError::ExecutionFailed(err.to_string())
    }
}

impl From<crate::error::StoreError> for ToolError {
    fn from(err: crate::error::StoreError) -> Self {
        ToolError::ExecutionFailed(err.to_string())
    }
}

impl From<crate::error::MailboxError> for ToolError {
    fn from(err: crate::error::MailboxError) -> Self {
        ToolError::ExternalService(err.to_string())
    }
}

impl From<crate::error::McpError> for ToolError {
    fn from(err: crate::error::McpError) -> Self {
        ToolError::ExternalService(err.to_string())
    }
}

/// Output from a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    /// The result data.
    pub result: serde_json::Value,
    /// Time taken.
    pub duration: Duration,
}

impl ToolOutput {
    /// Create a successful output with a JSON result.
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }

    /// Create a text output.
    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            result: serde_json::Value::String(text.into()),
            duration,
        }
    }

    /// Render the result as the string handed back to the model.
    ///
    /// Plain strings are passed through unquoted; anything else is JSON.
    pub fn to_model_text(&self) -> String {
        match &self.result {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Where a tool came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolProvenance {
    /// Built into this process.
    Local,
    /// Discovered from an external provider at catalog assembly.
    Remote { provider: String },
}

impl fmt::Display for ToolProvenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Remote { provider } => write!(f, "remote:{provider}"),
        }
    }
}

/// Trait for tools that the agent can use.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool name.
    fn name(&self) -> &str;

    /// Get a description of what the tool does.
    fn description(&self) -> &str;

    /// Get the JSON Schema for the tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given parameters.
    async fn execute(
        &self,
        params: serde_json::Value,
        ctx: &TurnContext,
    ) -> Result<ToolOutput, ToolError>;

    fn provenance(&self) -> ToolProvenance {
        ToolProvenance::Local
    }

    /// Get the tool definition for LLM function calling.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Extract a required string parameter.
pub fn require_str<'a>(params: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{}' parameter", key)))
}

/// Extract an optional non-negative integer parameter, falling back to `default`.
pub fn optional_u32(
    params: &serde_json::Value,
    key: &str,
    default: u32,
) -> Result<u32, ToolError> {
    match params.get(key) {
        None | Some(serde_json::Value::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                ToolError::InvalidParameters(format!("'{}' must be a non-negative integer", key))
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_reports_missing_key() {
        let params = serde_json::json!({"sender": "a@x.com"});
        assert_eq!(require_str(&params, "sender").unwrap(), "a@x.com");

        let err = require_str(&params, "rule").unwrap_err();
        assert!(err.to_string().contains("'rule'"));
    }

    #[test]
    fn optional_u32_defaults_and_validates() {
        let params = serde_json::json!({"days": 7, "bad": -1});
        assert_eq!(optional_u32(&params, "days", 3).unwrap(), 7);
        assert_eq!(optional_u32(&params, "max_results", 20).unwrap(), 20);
        assert!(optional_u32(&params, "bad", 1).is_err());
    }

    #[test]
    fn model_text_unquotes_strings() {
        let out = ToolOutput::text("no_rule", Duration::ZERO);
        assert_eq!(out.to_model_text(), "no_rule");

        let out = ToolOutput::success(serde_json::json!({"ok": true}), Duration::ZERO);
        assert_eq!(out.to_model_text(), r#"{"ok":true}"#);
    }

    #[test]
    fn provenance_display() {
        assert_eq!(ToolProvenance::Local.to_string(), "local");
        let remote = ToolProvenance::Remote {
            provider: "notion".into(),
        };
        assert_eq!(remote.to_string(), "remote:notion");
    }
}
