//! Runtime configuration, read from the environment.
//!
//! `.env` files are loaded by the binary before this runs; everything here
//! only looks at variables that are already set.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{DEFAULT_MODEL, LlmConfig, RetryPolicy};

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_SESSION_ID: &str = "session_1";
pub const DEFAULT_NOTION_DATABASE_ID: &str = "2b8c3719a408805a9871ce867656d1e7";

/// Settings the agent builder needs to construct the agent.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    /// Model API key. Absence is only reported when the agent is built.
    pub api_key: Option<SecretString>,
    pub model: String,
    pub rules_path: PathBuf,
    pub mcp_config_path: PathBuf,
    pub gmail_token_path: PathBuf,
    /// Task database the instruction tells the model about.
    pub notion_database_id: String,
    /// Upper bound on model round-trips within one turn.
    pub max_iterations: usize,
    pub retry: RetryPolicy,
}

impl AgentSettings {
    /// Model configuration, or a configuration fault if no key is set.
    pub fn llm_config(&self) -> Result<LlmConfig, ConfigError> {
        let api_key = self.api_key.clone().ok_or_else(|| ConfigError::MissingRequired {
            key: "GOOGLE_API_KEY".to_string(),
            hint: "Set GOOGLE_API_KEY (or GEMINI_API_KEY) to a Gemini API key".to_string(),
        })?;
        Ok(LlmConfig {
            api_key,
            model: self.model.clone(),
            retry: self.retry,
        })
    }
}

/// HTTP server settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub session_id: String,
    /// Directory for the rolling log file; stderr only when unset.
    pub log_dir: Option<PathBuf>,
}

impl ServerSettings {
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                key: "DECLUTTER_HOST".to_string(),
                message: e.to_string(),
            })
    }
}

/// Complete application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub agent: AgentSettings,
    pub server: ServerSettings,
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let api_key = var("GOOGLE_API_KEY")
            .or_else(|| var("GEMINI_API_KEY"))
            .map(SecretString::from);

        let port = match var("DECLUTTER_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| ConfigError::InvalidValue {
                key: "DECLUTTER_PORT".to_string(),
                message: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let max_iterations = match var("DECLUTTER_MAX_ITERATIONS") {
            Some(raw) => match raw.parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "DECLUTTER_MAX_ITERATIONS".to_string(),
                        message: format!("expected a positive integer, got '{raw}'"),
                    });
                }
            },
            None => crate::agent::DEFAULT_MAX_ITERATIONS,
        };

        let mut retry = RetryPolicy::default();
        if let Some(raw) = var("DECLUTTER_LLM_MAX_RETRIES") {
            retry.max_retries = raw.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: "DECLUTTER_LLM_MAX_RETRIES".to_string(),
                    message: e.to_string(),
                }
            })?;
        }
        if let Some(raw) = var("DECLUTTER_LLM_RETRY_BASE_MS") {
            let ms: u64 = raw.parse().map_err(|e: std::num::ParseIntError| {
                ConfigError::InvalidValue {
                    key: "DECLUTTER_LLM_RETRY_BASE_MS".to_string(),
                    message: e.to_string(),
                }
            })?;
            retry.base_delay = Duration::from_millis(ms);
        }

        Ok(Self {
            agent: AgentSettings {
                api_key,
                model: var("DECLUTTER_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                rules_path: var("DECLUTTER_RULES_PATH")
                    .unwrap_or_else(|| "preferences.json".to_string())
                    .into(),
                mcp_config_path: var("DECLUTTER_MCP_CONFIG")
                    .unwrap_or_else(|| "mcp_config.json".to_string())
                    .into(),
                gmail_token_path: var("GMAIL_TOKEN_PATH")
                    .unwrap_or_else(|| "token.json".to_string())
                    .into(),
                notion_database_id: var("NOTION_DATABASE_ID")
                    .unwrap_or_else(|| DEFAULT_NOTION_DATABASE_ID.to_string()),
                max_iterations,
                retry,
            },
            server: ServerSettings {
                host: var("DECLUTTER_HOST").unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port,
                session_id: var("DECLUTTER_SESSION_ID")
                    .unwrap_or_else(|| DEFAULT_SESSION_ID.to_string()),
                log_dir: var("DECLUTTER_LOG_DIR").map(PathBuf::from),
            },
        })
    }
}
