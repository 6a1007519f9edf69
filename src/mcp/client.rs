//! Stdio MCP client.
//!
//! Spawns a provider subprocess, performs the `initialize` handshake, lists
//! its tools and wraps each one in an [`McpTool`] adapter. All adapters of one
//! provider share a single connection; the subprocess is killed once the last
//! adapter is dropped.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::context::TurnContext;
use crate::error::McpError;
use crate::mcp::config::ProviderSpec;
use crate::mcp::types::*;
use crate::tools::catalog::ToolProviderFactory;
use crate::tools::tool::{Tool, ToolError, ToolOutput, ToolProvenance};

/// Upper bound on `tools/list` pages, guarding against a cursor loop.
const MAX_LIST_PAGES: usize = 32;

struct Connection {
    /// Held so the process lives as long as the connection.
    _child: Child,
    writer: ChildStdin,
    reader: BufReader<ChildStdout>,
    /// Partial line kept across a read that was cancelled by a timeout.
    line: String,
    next_id: i64,
}

impl Connection {
    async fn write_line(&mut self, message: &impl serde::Serialize) -> Result<(), McpError> {
        let json = serde_json::to_string(message)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn request(&mut self, method: &str, params: Option<Value>) -> Result<Value, McpError> {
        let id = self.send_request(method, params).await?;
        self.read_response(id).await
    }

    /// Write a request line and return its id.
    async fn send_request(&mut self, method: &str, params: Option<Value>) -> Result<i64, McpError> {
        let id = self.next_id;
        self.next_id += 1;

        tracing::debug!(method = %method, id, "Sending request");
        self.write_line(&JsonRpcRequest::new(RpcId::Number(id), method, params))
            .await?;
        Ok(id)
    }

    /// Wait for the response carrying `id`.
    ///
    /// Notifications, server-initiated requests and stray output lines are
    /// skipped, as are late responses to requests that were abandoned. Safe to
    /// cancel: a partially read line stays buffered for the next call.
    async fn read_response(&mut self, id: i64) -> Result<Value, McpError> {
        loop {
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Err(McpError::ServerUnavailable(
                    "provider closed its output".to_string(),
                ));
            }
            let line = std::mem::take(&mut self.line);

            let Ok(raw) = serde_json::from_str::<Value>(line.trim()) else {
                tracing::debug!(line = %line.trim(), "Ignoring non-JSON provider output");
                continue;
            };
            if raw.get("method").is_some() || raw.get("id") != Some(&Value::from(id)) {
                continue;
            }

            let response: JsonRpcResponse = serde_json::from_value(raw)?;
            return response.into_result().map_err(|err| match err.code {
                error_codes::METHOD_NOT_FOUND => McpError::MethodNotFound(err.message),
                error_codes::INVALID_PARAMS => McpError::InvalidParams(err.message),
                _ => McpError::ToolExecution(err.message),
            });
        }
    }

    async fn notify(&mut self, method: &str) -> Result<(), McpError> {
        self.write_line(&JsonRpcNotification::new(method, None))
            .await
    }
}

/// A connected provider.
pub struct McpClient {
    provider: String,
    call_timeout: Duration,
    conn: Arc<Mutex<Connection>>,
}

impl McpClient {
    /// Launch the provider described by `spec` and complete the handshake.
    pub async fn connect(spec: &ProviderSpec) -> Result<Self, McpError> {
        tracing::info!(provider = %spec.name, command = %spec.command, "Spawning tool provider");

        let mut child = Command::new(&spec.command)
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| McpError::Spawn {
                command: spec.command.clone(),
                reason: e.to_string(),
            })?;

        let writer = child.stdin.take().ok_or_else(|| {
            McpError::ServerUnavailable("failed to capture provider stdin".to_string())
        })?;
        let reader = child.stdout.take().ok_or_else(|| {
            McpError::ServerUnavailable("failed to capture provider stdout".to_string())
        })?;

        let client = Self {
            provider: spec.name.clone(),
            call_timeout: spec.timeout,
            conn: Arc::new(Mutex::new(Connection {
                _child: child,
                writer,
                reader: BufReader::new(reader),
                line: String::new(),
                next_id: 1,
            })),
        };
        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: PeerInfo {
                name: env!("CARGO_PKG_NAME").to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            },
        };

        let mut conn = self.conn.lock().await;
        let result = conn
            .request("initialize", Some(serde_json::to_value(params)?))
            .await
            .map_err(|e| McpError::ServerUnavailable(format!("initialize failed: {}", e)))?;
        let result: InitializeResult = serde_json::from_value(result)?;
        conn.notify("notifications/initialized").await?;
        drop(conn);

        if result.protocol_version != PROTOCOL_VERSION {
            tracing::warn!(
                provider = %self.provider,
                version = %result.protocol_version,
                "Provider negotiated a different protocol version"
            );
        }
        tracing::info!(
            provider = %self.provider,
            server = %result.server_info.name,
            "Tool provider initialized"
        );
        Ok(())
    }

    /// All tools the provider offers, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>, McpError> {
        let mut conn = self.conn.lock().await;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.take().map(|c| serde_json::json!({ "cursor": c }));
            let page: ListToolsResult =
                serde_json::from_value(conn.request("tools/list", params).await?)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => return Ok(tools),
            }
        }

        tracing::warn!(provider = %self.provider, "tools/list pagination did not terminate");
        Ok(tools)
    }

    /// Wrap every listed tool in an adapter bound to this connection.
    pub async fn into_tools(self) -> Result<Vec<Arc<dyn Tool>>, McpError> {
        let infos = self.list_tools().await?;
        Ok(infos
            .into_iter()
            .map(|info| {
                tracing::debug!(provider = %self.provider, tool = %info.name, "Discovered tool");
                Arc::new(McpTool {
                    info,
                    provider: self.provider.clone(),
                    call_timeout: self.call_timeout,
                    conn: Arc::clone(&self.conn),
                }) as Arc<dyn Tool>
            })
            .collect())
    }
}

/// A remote tool, callable like a local one.
pub struct McpTool {
    info: ToolInfo,
    provider: String,
    call_timeout: Duration,
    conn: Arc<Mutex<Connection>>,
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.info.name
    }

    fn description(&self) -> &str {
        &self.info.description
    }

    fn parameters_schema(&self) -> Value {
        self.info.input_schema.clone()
    }

    async fn execute(&self, params: Value, ctx: &TurnContext) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let arguments = if params.is_null() {
            serde_json::json!({})
        } else {
            params
        };

        tracing::debug!(
            turn_id = %ctx.turn_id,
            provider = %self.provider,
            tool = %self.info.name,
            "Calling remote tool"
        );
        let params = serde_json::to_value(CallToolParams {
            name: self.info.name.clone(),
            arguments,
        })
        .map_err(McpError::from)?;

        // Only the wait is bounded: a cancelled write would leave half a
        // request on the shared stdin.
        let mut conn = self.conn.lock().await;
        let id = conn.send_request("tools/call", Some(params)).await?;
        let raw = tokio::time::timeout(self.call_timeout, conn.read_response(id))
            .await
            .map_err(|_| ToolError::Timeout(self.call_timeout))??;
        drop(conn);
        let result: CallToolResult = serde_json::from_value(raw).map_err(McpError::from)?;

        let text = result.joined_text();
        if result.is_error {
            return Err(ToolError::ExternalService(text));
        }
        Ok(ToolOutput::text(text, start.elapsed()))
    }

    fn provenance(&self) -> ToolProvenance {
        ToolProvenance::Remote {
            provider: self.provider.clone(),
        }
    }
}

/// Discovers tools by launching each provider as a stdio subprocess.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdioProviderFactory;

#[async_trait]
impl ToolProviderFactory for StdioProviderFactory {
    async fn discover(&self, spec: &ProviderSpec) -> Result<Vec<Arc<dyn Tool>>, McpError> {
        McpClient::connect(spec).await?.into_tools().await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn spec(command: &str, args: &[&str]) -> ProviderSpec {
        ProviderSpec {
            name: "fake".to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn nonexistent_command_is_spawn_error() {
        let err = McpClient::connect(&spec("/definitely/not/a/provider", &[]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn provider_that_exits_is_unavailable() {
        let err = McpClient::connect(&spec("sh", &["-c", "exit 0"]))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, McpError::ServerUnavailable(_)));
    }

    /// Scripted provider: answers initialize, tools/list and one tools/call,
    /// with a notification and some log noise in between.
    #[cfg(unix)]
    const SCRIPTED_PROVIDER: &str = r#"
read line
echo 'starting up'
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"scripted"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}'
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"create_notion_task","description":"Create a task","inputSchema":{"type":"object"}}]}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"Successfully created"},{"type":"text","text":"URL: https://notion.so/x"}]}}'
read line
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn discovers_and_calls_remote_tool() {
        let tools = StdioProviderFactory
            .discover(&spec("sh", &["-c", SCRIPTED_PROVIDER]))
            .await
            .unwrap();
        assert_eq!(tools.len(), 1);

        let tool = &tools[0];
        assert_eq!(tool.name(), "create_notion_task");
        assert_eq!(
            tool.provenance(),
            ToolProvenance::Remote {
                provider: "fake".to_string()
            }
        );

        let out = tool
            .execute(serde_json::json!({"title": "x"}), &TurnContext::default())
            .await
            .unwrap();
        assert_eq!(
            out.to_model_text(),
            "Successfully created\nURL: https://notion.so/x"
        );
    }

    /// Scripted provider whose first tools/call answers after the caller has
    /// given up; the second is answered at once.
    #[cfg(unix)]
    const SLOW_FIRST_CALL_PROVIDER: &str = r#"
read line
printf '%s\n' '{"jsonrpc":"2.0","id":1,"result":{"protocolVersion":"2024-11-05","capabilities":{"tools":{}},"serverInfo":{"name":"slow"}}}'
read line
read line
printf '%s\n' '{"jsonrpc":"2.0","id":2,"result":{"tools":[{"name":"create_notion_task","description":"Create a task","inputSchema":{"type":"object"}}]}}'
read line
sleep 1
printf '%s\n' '{"jsonrpc":"2.0","id":3,"result":{"content":[{"type":"text","text":"late"}]}}'
read line
printf '%s\n' '{"jsonrpc":"2.0","id":4,"result":{"content":[{"type":"text","text":"on time"}]}}'
read line
"#;

    #[cfg(unix)]
    #[tokio::test]
    async fn connection_stays_usable_after_a_call_timeout() {
        let mut slow = spec("sh", &["-c", SLOW_FIRST_CALL_PROVIDER]);
        slow.timeout = Duration::from_millis(500);
        let tools = StdioProviderFactory.discover(&slow).await.unwrap();
        let tool = &tools[0];
        let ctx = TurnContext::default();

        let err = tool
            .execute(serde_json::json!({"title": "x"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));

        let out = tool
            .execute(serde_json::json!({"title": "y"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.to_model_text(), "on time");
    }
}
