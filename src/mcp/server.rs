//! Minimal MCP server: exposes a `ToolCatalog` over a line transport.

use serde_json::Value;

use crate::context::TurnContext;
use crate::error::McpError;
use crate::mcp::transport::McpTransport;
use crate::mcp::types::*;
use crate::tools::ToolCatalog;

pub struct McpServer {
    catalog: ToolCatalog,
    name: String,
    version: String,
}

impl McpServer {
    pub fn new(name: impl Into<String>, catalog: ToolCatalog) -> Self {
        Self {
            catalog,
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Serve requests until the transport closes.
    pub async fn run<T: McpTransport>(&self, transport: &mut T) -> Result<(), McpError> {
        tracing::info!(server = %self.name, tools = self.catalog.len(), "MCP server starting");

        while let Some(line) = transport.receive().await? {
            tracing::debug!(message = %line, "Received message");

            let raw: Value = match serde_json::from_str(&line) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "Unparseable message");
                    let err = McpError::JsonParse(e);
                    let resp = JsonRpcResponse::error(RpcId::Number(0), JsonRpcError::from(&err));
                    transport.send(&serde_json::to_string(&resp)?).await?;
                    continue;
                }
            };

            if raw.get("id").is_none() {
                if let Some(method) = raw.get("method").and_then(|m| m.as_str()) {
                    tracing::debug!(method = %method, "Notification");
                }
                continue;
            }

            let response = match serde_json::from_value::<JsonRpcRequest>(raw) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    let err = McpError::InvalidParams(e.to_string());
                    JsonRpcResponse::error(RpcId::Number(0), JsonRpcError::from(&err))
                }
            };
            transport.send(&serde_json::to_string(&response)?).await?;
        }

        tracing::info!("Transport closed, shutting down");
        Ok(())
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id;
        let outcome = match request.method.as_str() {
            "initialize" => self.initialize(),
            "ping" => Ok(serde_json::json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            method => Err(McpError::MethodNotFound(method.to_string())),
        };

        match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::warn!(error = %e, "Request failed");
                JsonRpcResponse::error(id, JsonRpcError::from(&e))
            }
        }
    }

    fn initialize(&self) -> Result<Value, McpError> {
        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: PeerInfo {
                name: self.name.clone(),
                version: Some(self.version.clone()),
            },
        };
        Ok(serde_json::to_value(result)?)
    }

    fn list_tools(&self) -> Result<Value, McpError> {
        let tools = self
            .catalog
            .tool_definitions()
            .into_iter()
            .map(ToolInfo::from)
            .collect();
        Ok(serde_json::to_value(ListToolsResult {
            tools,
            next_cursor: None,
        })?)
    }

    async fn call_tool(&self, params: Option<Value>) -> Result<Value, McpError> {
        let params = params.ok_or_else(|| McpError::InvalidParams("missing params".into()))?;
        let call: CallToolParams =
            serde_json::from_value(params).map_err(|e| McpError::InvalidParams(e.to_string()))?;

        let tool = self
            .catalog
            .get(&call.name)
            .ok_or_else(|| McpError::ToolNotFound(call.name.clone()))?;

        tracing::info!(tool = %call.name, "Handling tools/call");
        let ctx = TurnContext::new(self.name.clone());
        let result = match tool.execute(call.arguments, &ctx).await {
            Ok(output) => CallToolResult::text(output.to_model_text(), false),
            Err(e) => CallToolResult::text(e.to_string(), true),
        };
        Ok(serde_json::to_value(result)?)
    }
}
