//! MCP tool provider exposing `create_notion_task` over stdio.
//!
//! Launched by the assistant through `mcp_config.json`. stdout carries the
//! protocol, so all logging goes to stderr.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use inbox_declutter::mcp::{LineTransport, McpServer};
use inbox_declutter::tasks::notion::{NotionConfig, NotionTaskTracker};
use inbox_declutter::tools::{Tool, ToolCatalog};
use inbox_declutter::tools::builtin::CreateTaskTool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let config = NotionConfig::from_env();
    if config.api_key.is_none() {
        tracing::warn!("NOTION_API_KEY is not set; task creation will fail until it is");
    }
    if config.database_id.is_none() {
        tracing::warn!("NOTION_DATABASE_ID is not set; task creation will fail until it is");
    }

    let tracker = Arc::new(NotionTaskTracker::new(config));
    let tools: Vec<Arc<dyn Tool>> = vec![Arc::new(CreateTaskTool::new(tracker))];
    let catalog = ToolCatalog::new(tools);
    let server = McpServer::new("notion-server", catalog);

    tracing::info!("Notion task provider ready on stdio");
    let mut transport = LineTransport::stdio();
    server
        .run(&mut transport)
        .await
        .context("MCP server loop failed")?;

    tracing::info!("Client disconnected, exiting");
    Ok(())
}
