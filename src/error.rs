//! Error types for Inbox Declutter.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} rejected the request: {reason}")]
    InvalidRequest { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

impl LlmError {
    /// Whether a retry has a chance of succeeding. Rejected requests are
    /// deterministic and are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::RequestFailed { .. })
    }
}

/// Tool-provider (MCP) errors.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] std::io::Error),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    #[error("Failed to launch {command}: {reason}")]
    Spawn { command: String, reason: String },

    #[error("Provider {server} did not become ready within {timeout:?}")]
    Timeout { server: String, timeout: Duration },

    #[error("Server unavailable: {0}")]
    ServerUnavailable(String),
}

/// Rule store errors. Only raised on writes; load faults are absorbed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to write rule file {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize rules: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Mailbox collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Mailbox not configured: {0}")]
    NotConfigured(String),

    #[error("Mailbox authentication failed: {0}")]
    Auth(String),

    #[error("Mailbox request failed: {0}")]
    Request(String),

    #[error("Mailbox API returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Task-tracking collaborator errors.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    #[error("Task tracker not configured: {0}")]
    NotConfigured(String),

    #[error("Task request failed: {0}")]
    Request(String),

    #[error("Task API returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Agent construction errors.
///
/// Cloneable so that callers queued behind a failed attempt can all observe
/// the same failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InitError {
    #[error("Configuration fault: {0}")]
    Config(String),

    #[error("Tool catalog assembly failed: {0}")]
    ToolAssembly(String),

    #[error("Model handle could not be created: {0}")]
    Model(String),
}

impl InitError {
    /// Short machine-usable cause category.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::ToolAssembly(_) => "tool_assembly",
            Self::Model(_) => "model",
        }
    }
}

impl From<ConfigError> for InitError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<LlmError> for InitError {
    fn from(err: LlmError) -> Self {
        Self::Model(err.to_string())
    }
}

/// Errors raised while consuming a turn's event sequence.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Model request failed: {0}")]
    Model(#[from] LlmError),

    #[error("Runner failed: {0}")]
    Runner(String),

    #[error("Turn was cancelled before completion")]
    Cancelled,
}

impl TurnError {
    /// Short machine-usable cause category.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Model(_) => "turn_model",
            Self::Runner(_) => "turn_runner",
            Self::Cancelled => "turn_cancelled",
        }
    }
}

/// Errors returned to a chat caller.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Init(#[from] InitError),

    #[error(transparent)]
    Turn(#[from] TurnError),
}

impl ChatError {
    /// Short machine-usable cause category.
    pub fn category(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "invalid_request",
            Self::Init(e) => e.category(),
            Self::Turn(e) => e.category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_error_categories() {
        assert_eq!(InitError::Config("x".into()).category(), "config");
        assert_eq!(InitError::ToolAssembly("x".into()).category(), "tool_assembly");
        assert_eq!(InitError::Model("x".into()).category(), "model");
    }

    #[test]
    fn config_error_converts_into_init_error() {
        let err: InitError = ConfigError::MissingRequired {
            key: "GOOGLE_API_KEY".into(),
            hint: "Set it in .env".into(),
        }.into();
        assert_eq!(err.category(), "config");
        assert!(err.to_string().contains("GOOGLE_API_KEY"));
    }

    #[test]
    fn turn_error_categories() {
        let model = TurnError::Model(LlmError::AuthFailed {
            provider: "gemini".into(),
        });
        assert_eq!(model.category(), "turn_model");
        assert_eq!(TurnError::Runner("boom".into()).category(), "turn_runner");
        assert_eq!(TurnError::Cancelled.category(), "turn_cancelled");
    }

    #[test]
    fn chat_error_delegates_category() {
        assert_eq!(ChatError::EmptyMessage.category(), "invalid_request");
        assert_eq!(ChatError::from(InitError::Config("x".into())).category(), "config");
        assert_eq!(ChatError::from(TurnError::Cancelled).category(), "turn_cancelled");
    }

    #[test]
    fn transient_llm_errors() {
        assert!(
            LlmError::RateLimited {
                provider: "gemini".into(),
                retry_after: None
            }
            .is_transient()
        );
        assert!(
            !LlmError::AuthFailed {
                provider: "gemini".into()
            }
            .is_transient()
        );
        assert!(
            !LlmError::InvalidRequest {
                provider: "gemini".into(),
                reason: "400 INVALID_ARGUMENT".into()
            }
            .is_transient()
        );
    }
}
