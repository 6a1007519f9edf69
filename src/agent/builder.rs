//! Agent construction: model handle, instruction, and tool catalog.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::AgentSettings;
use crate::error::InitError;
use crate::llm::{LlmProvider, create_provider};
use crate::mailbox::Mailbox;
use crate::mcp::{StdioProviderFactory, load_provider_specs};
use crate::rules::RuleStore;
use crate::tools::builtin::{mailbox_tools, rule_tools};
use crate::tools::{Tool, ToolCatalog, ToolProviderFactory};

pub const AGENT_NAME: &str = "DigitalDeclutter";

const INSTRUCTION_TEMPLATE: &str = include_str!("instruction.md");

/// System instruction with the task database id filled in.
pub fn render_instruction(notion_database_id: &str) -> String {
    INSTRUCTION_TEMPLATE.replace("{notion_database_id}", notion_database_id)
}

/// Everything a turn needs. Built once and then only read.
pub struct AgentDescriptor {
    pub name: String,
    pub model: Arc<dyn LlmProvider>,
    pub instruction: String,
    pub catalog: Arc<ToolCatalog>,
    pub max_iterations: usize,
}

impl AgentDescriptor {
    pub fn model_id(&self) -> &str {
        self.model.model_name()
    }
}

impl std::fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.name)
            .field("model", &self.model_id())
            .field("catalog", &self.catalog)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

/// Produces a fully built agent or a typed construction error.
#[async_trait]
pub trait AgentFactory: Send + Sync {
    async fn build(&self) -> Result<AgentDescriptor, InitError>;
}

/// Builds the triage agent from configuration.
pub struct AgentBuilder {
    settings: AgentSettings,
    rules: Arc<RuleStore>,
    mailbox: Arc<dyn Mailbox>,
    providers: Arc<dyn ToolProviderFactory>,
}

impl AgentBuilder {
    pub fn new(settings: AgentSettings, rules: Arc<RuleStore>, mailbox: Arc<dyn Mailbox>) -> Self {
        Self {
            settings,
            rules,
            mailbox,
            providers: Arc::new(StdioProviderFactory),
        }
    }

    /// Replace the factory used to discover remote tools.
    pub fn with_provider_factory(mut self, providers: Arc<dyn ToolProviderFactory>) -> Self {
        self.providers = providers;
        self
    }

    /// Rule tools followed by mailbox tools.
    pub fn local_tools(&self) -> Vec<Arc<dyn Tool>> {
        let mut tools = rule_tools(Arc::clone(&self.rules));
        tools.extend(mailbox_tools(Arc::clone(&self.mailbox)));
        tools
    }
}

#[async_trait]
impl AgentFactory for AgentBuilder {
    async fn build(&self) -> Result<AgentDescriptor, InitError> {
        let llm_config = self.settings.llm_config()?;
        let specs = load_provider_specs(&self.settings.mcp_config_path)?;
        let model = create_provider(&llm_config)?;

        let local = self.local_tools();
        validate_local_tools(&local).map_err(InitError::ToolAssembly)?;
        let local_count = local.len();

        let catalog = ToolCatalog::assemble(local, &specs, self.providers.as_ref()).await;

        tracing::info!(
            agent = AGENT_NAME,
            model = %model.model_name(),
            local_tools = local_count,
            remote_tools = catalog.len() - local_count,
            failed_providers = catalog.failed_providers().len(),
            "Agent configured"
        );

        Ok(AgentDescriptor {
            name: AGENT_NAME.to_string(),
            model,
            instruction: render_instruction(&self.settings.notion_database_id),
            catalog: Arc::new(catalog),
            max_iterations: self.settings.max_iterations,
        })
    }
}

/// Local tools must be callable by the model: a function-call-safe name, an
/// object parameter schema, and no two sharing a name.
fn validate_local_tools(tools: &[Arc<dyn Tool>]) -> Result<(), String> {
    let mut seen = HashSet::new();
    for tool in tools {
        let name = tool.name();
        if !is_callable_name(name) {
            return Err(format!("tool name '{name}' is not a valid function name"));
        }
        if !seen.insert(name) {
            return Err(format!("local tool '{name}' is registered twice"));
        }
        let schema = tool.parameters_schema();
        if schema.get("type").and_then(|t| t.as_str()) != Some("object") {
            return Err(format!("tool '{name}' has a non-object parameter schema"));
        }
    }
    Ok(())
}

fn is_callable_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 64
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}
