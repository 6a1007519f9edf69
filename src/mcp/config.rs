//! Provider specs parsed from an `mcpServers` JSON document.
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "notion": {
//!       "command": "declutter-notion-mcp",
//!       "args": [],
//!       "env": { "NOTION_API_KEY": "..." },
//!       "timeout": 60
//!     }
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Bounded wait for a provider to start and list its tools.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// How to launch one stdio tool provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSpec {
    pub name: String,
    pub command: String,
    pub args: Vec<String>,
    /// Variables set on top of the inherited environment.
    pub env: HashMap<String, String>,
    pub timeout: Duration,
}

/// Read provider specs from `path`.
///
/// A missing file means no providers. A file that is not valid JSON, or an
/// entry with a missing or mistyped field, is a configuration fault. Entries
/// marked `"enabled": false` and URL-only entries are skipped.
pub fn load_provider_specs(path: &Path) -> Result<Vec<ProviderSpec>, ConfigError> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(
                path = %path.display(),
                "Provider config not found, continuing without remote tools"
            );
            return Ok(Vec::new());
        }
        Err(e) => return Err(ConfigError::Io(e)),
    };

    let doc: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
        ConfigError::ParseError(format!("{}: {}", path.display(), e))
    })?;
    parse_provider_specs(&doc)
}

/// Parse the `mcpServers` object of an already-decoded document.
pub fn parse_provider_specs(doc: &serde_json::Value) -> Result<Vec<ProviderSpec>, ConfigError> {
    let Some(root) = doc.as_object() else {
        return Err(ConfigError::ParseError(
            "provider config must be a JSON object".to_string(),
        ));
    };
    let Some(servers) = root.get("mcpServers") else {
        return Ok(Vec::new());
    };
    let Some(servers) = servers.as_object() else {
        return Err(ConfigError::InvalidValue {
            key: "mcpServers".to_string(),
            message: "expected an object keyed by server name".to_string(),
        });
    };

    let mut specs = Vec::new();
    for (name, entry) in servers {
        let Some(obj) = entry.as_object() else {
            return Err(invalid(name, None, "expected an object"));
        };

        if obj.get("enabled").and_then(|v| v.as_bool()) == Some(false) {
            tracing::info!(provider = %name, "Provider disabled, skipping");
            continue;
        }

        let command = match obj.get("command") {
            Some(serde_json::Value::String(command)) if !command.trim().is_empty() => command,
            Some(_) => {
                return Err(invalid(name, Some("command"), "expected a non-empty string"));
            }
            None if obj.contains_key("url") => {
                tracing::warn!(
                    provider = %name,
                    "Remote (URL) providers are not supported, skipping"
                );
                continue;
            }
            None => return Err(invalid(name, Some("command"), "missing")),
        };

        let args = match obj.get("args") {
            None => Vec::new(),
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| invalid(name, Some("args"), "every argument must be a string"))?,
            Some(_) => return Err(invalid(name, Some("args"), "expected an array of strings")),
        };

        let env = match obj.get("env") {
            None => HashMap::new(),
            Some(serde_json::Value::Object(vars)) => vars
                .iter()
                .map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect::<Option<HashMap<_, _>>>()
                .ok_or_else(|| invalid(name, Some("env"), "every value must be a string"))?,
            Some(_) => return Err(invalid(name, Some("env"), "expected an object of strings")),
        };

        let timeout = match obj.get("timeout").map(|v| v.as_u64()) {
            None => DEFAULT_CONNECT_TIMEOUT,
            Some(Some(secs)) if secs > 0 => Duration::from_secs(secs),
            Some(_) => {
                return Err(invalid(name, Some("timeout"), "expected a positive number of seconds"));
            }
        };

        specs.push(ProviderSpec {
            name: name.clone(),
            command: command.clone(),
            args,
            env,
            timeout,
        });
    }

    Ok(specs)
}

fn invalid(name: &str, field: Option<&str>, message: &str) -> ConfigError {
    let key = match field {
        Some(field) => format!("mcpServers.{name}.{field}"),
        None => format!("mcpServers.{name}"),
    };
    ConfigError::InvalidValue {
        key,
        message: message.to_string(),
    }
}
