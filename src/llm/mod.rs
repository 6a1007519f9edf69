//! LLM integration for Inbox Declutter.
//!
//! Gemini is reached through rig-core; `RigAdapter` bridges rig's
//! `CompletionModel` to our `LlmProvider` trait and `RetryingProvider`
//! wraps it for transient failures.

pub mod costs;
pub mod provider;
pub mod retry;
mod rig_adapter;

pub use provider::*;
pub use retry::{RetryPolicy, RetryingProvider};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::{ExposeSecret, SecretString};

use crate::error::LlmError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: SecretString,
    pub model: String,
    pub retry: RetryPolicy,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.api_key.expose_secret().trim().is_empty() {
        return Err(LlmError::AuthFailed {
            provider: "gemini".to_string(),
        });
    }
    if config.model.trim().is_empty() {
        return Err(LlmError::InvalidRequest {
            provider: "gemini".to_string(),
            reason: "model identifier is empty".to_string(),
        });
    }

    let base = create_gemini_provider(config)?;
    Ok(Arc::new(RetryingProvider::new(base, config.retry)))
}

fn create_gemini_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::gemini;

    let client: gemini::Client =
        gemini::Client::new(config.api_key.expose_secret()).map_err(|e| {
            LlmError::RequestFailed {
                provider: "gemini".to_string(),
                reason: format!("Failed to create Gemini client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!(model = %config.model, "Using Gemini via rig");
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}
