//! MCP server over a stdio transport.
//!
//! Reads line-delimited JSON-RPC 2.0 messages from stdin and writes
//! responses to stdout. Log output goes to stderr so the protocol stream
//! stays clean.

use crate::mcp::protocol::*;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Protocol versions this server accepts from clients.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

/// Tool handler trait for implementing tool execution.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, params: CallToolParams) -> Result<CallToolResult>;
}

/// Connection state tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

/// MCP server state: identity, capabilities, and registered tools.
pub struct McpServer {
    pub server_info: Implementation,
    pub capabilities: ServerCapabilities,
    tools: Arc<RwLock<HashMap<String, Tool>>>,
    tool_handlers: Arc<RwLock<HashMap<String, Box<dyn ToolHandler>>>>,
    connection_state: Arc<RwLock<ConnectionState>>,
}

impl McpServer {
    #[inline]
    pub fn new(name: String, version: String) -> Self {
        let server_info = Implementation { name, version };
        let capabilities = ServerCapabilities {
            experimental: None,
            logging: None,
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        };

        Self {
            server_info,
            capabilities,
            tools: Arc::new(RwLock::new(HashMap::new())),
            tool_handlers: Arc::new(RwLock::new(HashMap::new())),
            connection_state: Arc::new(RwLock::new(ConnectionState::Uninitialized)),
        }
    }

    /// Register a tool and its handler.
    #[inline]
    pub async fn register_tool<H>(&self, tool: Tool, handler: H)
    where
        H: ToolHandler + 'static,
    {
        let tool_name = tool.name.clone();
        self.tools.write().await.insert(tool_name.clone(), tool);
        self.tool_handlers
            .write()
            .await
            .insert(tool_name.clone(), Box::new(handler));
        debug!("registered tool: {tool_name}");
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.connection_state.read().await
    }

    #[inline]
    pub async fn registered_tools(&self) -> Vec<String> {
        self.tools.read().await.keys().cloned().collect()
    }

    /// Serve requests from stdin until EOF.
    #[inline]
    pub async fn serve_stdio(self: Arc<Self>) -> Result<()> {
        info!("starting MCP server on stdio");

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut reader = BufReader::new(stdin);

        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line).await {
                Ok(0) => {
                    info!("EOF reached, closing connection");
                    break;
                }
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }

                    let raw_value: Value = match serde_json::from_str(line) {
                        Ok(value) => value,
                        Err(e) => {
                            error!("failed to parse JSON: {e}");
                            let response =
                                JsonRpcErrorResponse::new(JsonRpcError::parse_error(), None);
                            self.send_message(
                                &mut stdout,
                                &JsonRpcMessage::ErrorResponse(response),
                            )
                            .await?;
                            continue;
                        }
                    };

                    match classify_message(raw_value) {
                        Ok(message) => {
                            if let Err(e) = self.process_message(message, &mut stdout).await {
                                error!("error processing message: {e}");
                            }
                        }
                        Err(e) => {
                            error!("message validation failed: {e}");
                            let response =
                                JsonRpcErrorResponse::new(JsonRpcError::invalid_request(), None);
                            self.send_message(
                                &mut stdout,
                                &JsonRpcMessage::ErrorResponse(response),
                            )
                            .await?;
                        }
                    }
                }
                Err(e) => {
                    error!("error reading from stdin: {e}");
                    break;
                }
            }
        }

        *self.connection_state.write().await = ConnectionState::Closed;
        info!("MCP server stopped");
        Ok(())
    }

    async fn process_message<W>(&self, message: JsonRpcMessage, writer: &mut W) -> Result<()>
    where
        W: AsyncWriteExt + Unpin,
    {
        match message {
            JsonRpcMessage::Request(request) => self.handle_request(request, writer).await,
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(notification).await
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("received unexpected response message from client");
                Ok(())
            }
        }
    }

    async fn handle_request<W>(&self, request: JsonRpcRequest, writer: &mut W) -> Result<()>
    where
        W: AsyncWriteExt + Unpin,
    {
        let result = match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "tools/list" => self.handle_list_tools().await,
            "tools/call" => self.handle_call_tool(request.params).await,
            "ping" => Ok(serde_json::json!({})),
            _ => {
                let response =
                    JsonRpcErrorResponse::new(JsonRpcError::method_not_found(), Some(request.id));
                return self
                    .send_message(writer, &JsonRpcMessage::ErrorResponse(response))
                    .await;
            }
        };

        match result {
            Ok(value) => {
                let response = JsonRpcResponse::new(value, request.id);
                self.send_message(writer, &JsonRpcMessage::Response(response))
                    .await
            }
            Err(e) => {
                error!("error handling request {}: {e}", request.method);
                let response = JsonRpcErrorResponse::new(
                    JsonRpcError::internal_error(Some(e.to_string())),
                    Some(request.id),
                );
                self.send_message(writer, &JsonRpcMessage::ErrorResponse(response))
                    .await
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) -> Result<()> {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                *self.connection_state.write().await = ConnectionState::Ready;
                info!("server ready to handle requests");
                Ok(())
            }
            "notifications/cancelled" => {
                debug!("received cancellation notification");
                Ok(())
            }
            _ => {
                warn!("unknown notification method: {}", notification.method);
                Ok(())
            }
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> Result<Value> {
        let params: InitializeParams = match params {
            Some(p) => serde_json::from_value(p)?,
            None => return Err(anyhow!("initialize request missing parameters")),
        };

        if !SUPPORTED_PROTOCOL_VERSIONS.contains(&params.protocol_version.as_str()) {
            return Err(anyhow!(
                "unsupported protocol version: {}. Supported: {}",
                params.protocol_version,
                SUPPORTED_PROTOCOL_VERSIONS.join(", ")
            ));
        }

        *self.connection_state.write().await = ConnectionState::Initializing;

        let result = InitializeResult {
            protocol_version: MCP_VERSION.to_string(),
            capabilities: self.capabilities.clone(),
            server_info: self.server_info.clone(),
            instructions: Some("Semantic code search MCP server".to_string()),
        };

        info!("client initialized: {}", params.client_info.name);
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_list_tools(&self) -> Result<Value> {
        let tools = self.tools.read().await;
        let result = ListToolsResult {
            tools: tools.values().cloned().collect(),
        };
        Ok(serde_json::to_value(result)?)
    }

    async fn handle_call_tool(&self, params: Option<Value>) -> Result<Value> {
        let params: CallToolParams = match params {
            Some(p) => serde_json::from_value(p)?,
            None => return Err(anyhow!("tool call request missing parameters")),
        };

        let handlers = self.tool_handlers.read().await;
        let handler = handlers
            .get(&params.name)
            .ok_or_else(|| anyhow!("Tool not found: {}", params.name))?;

        let result = handler.handle(params).await?;
        Ok(serde_json::to_value(result)?)
    }

    async fn send_message<W>(&self, writer: &mut W, message: &JsonRpcMessage) -> Result<()>
    where
        W: AsyncWriteExt + Unpin,
    {
        let json = serde_json::to_string(message)?;
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

/// Classify a raw JSON value as a request or notification. Anything else
/// from a client is invalid.
pub fn classify_message(raw: Value) -> Result<JsonRpcMessage> {
    let object = raw
        .as_object()
        .ok_or_else(|| anyhow!("message is not a JSON object"))?;

    match object.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => return Err(anyhow!("unsupported JSON-RPC version: {other}")),
        None => return Err(anyhow!("missing jsonrpc field")),
    }

    if object.get("method").is_none() {
        return Err(anyhow!("missing method field"));
    }

    if object.contains_key("id") {
        Ok(JsonRpcMessage::Request(serde_json::from_value(raw)?))
    } else {
        Ok(JsonRpcMessage::Notification(serde_json::from_value(raw)?))
    }
}
