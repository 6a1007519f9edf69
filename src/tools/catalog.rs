//! Immutable tool catalog and its assembly from local tools plus providers.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::McpError;
use crate::llm::ToolDefinition;
use crate::mcp::ProviderSpec;
use crate::tools::tool::Tool;

/// Discovers the tools offered by one external provider.
#[async_trait]
pub trait ToolProviderFactory: Send + Sync {
    /// Connect to the provider described by `spec` and list its tools.
    async fn discover(&self, spec: &ProviderSpec) -> Result<Vec<Arc<dyn Tool>>, McpError>;
}

/// Ordered, read-only set of tools offered to the model.
///
/// Duplicate names are kept; lookup returns the first registered tool.
#[derive(Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<Arc<dyn Tool>>,
    failed_providers: Vec<String>,
}

impl ToolCatalog {
    /// Catalog of the given tools only, in order.
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            failed_providers: Vec::new(),
        }
    }

    /// Build a catalog from `local` tools followed by every tool each provider
    /// reports. A provider that fails or times out is logged and skipped.
    pub async fn assemble(
        local: Vec<Arc<dyn Tool>>,
        providers: &[ProviderSpec],
        factory: &dyn ToolProviderFactory,
    ) -> Self {
        let mut tools = local;
        let mut failed_providers = Vec::new();

        for spec in providers {
            let discovered = match tokio::time::timeout(spec.timeout, factory.discover(spec)).await
            {
                Ok(result) => result,
                Err(_) => Err(McpError::Timeout {
                    server: spec.name.clone(),
                    timeout: spec.timeout,
                }),
            };

            match discovered {
                Ok(remote) => {
                    tracing::info!(
                        provider = %spec.name,
                        count = remote.len(),
                        "Discovered provider tools"
                    );
                    tools.extend(remote);
                }
                Err(e) => {
                    tracing::warn!(
                        provider = %spec.name,
                        command = %spec.command,
                        error = %e,
                        "Tool provider unavailable, continuing without it"
                    );
                    failed_providers.push(spec.name.clone());
                }
            }
        }

        let catalog = Self {
            tools,
            failed_providers,
        };
        catalog.log_shadowed();
        catalog
    }

    fn log_shadowed(&self) {
        let mut seen = HashSet::new();
        for tool in &self.tools {
            if !seen.insert(tool.name()) {
                tracing::warn!(
                    tool = %tool.name(),
                    provenance = %tool.provenance(),
                    "Duplicate tool name; the first registered tool wins"
                );
            }
        }
    }

    /// First tool registered under `name`.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == name)
    }

    /// Tool names in registration order, duplicates included.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Providers skipped during assembly.
    pub fn failed_providers(&self) -> &[String] {
        &self.failed_providers
    }

    /// Tool definitions for LLM function calling, one per distinct name.
    pub fn tool_definitions(&self) -> Vec<ToolDefinition> {
        let mut seen = HashSet::new();
        self.tools
            .iter()
            .filter(|t| seen.insert(t.name()))
            .map(|t| t.definition())
            .collect()
    }
}

impl std::fmt::Debug for ToolCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCatalog")
            .field("tools", &self.names())
            .field("failed_providers", &self.failed_providers)
            .finish()
    }
}
