//! MCP server implementation.

use std::io::{BufRead, BufReader, Write};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::RwLock;

use crate::anki::{AnkiBackend, AnkiConnectClient};
use crate::config::Config;
use crate::error::{codes, Result};
use crate::guard::{GuardedBackend, GuardedWriter};
use crate::protocol::{
    InitializeParams, InitializeResult, JsonRpcId, JsonRpcRequest, JsonRpcResponse,
    ListResourcesResult, ListToolsResult, McpMessage, ReadResourceParams, ResourcesCapability,
    ServerCapabilities, ServerInfo, ToolCallParams, ToolsCapability,
};
use crate::resources::{list_resources, read_resource};
use crate::tools::ToolRegistry;

/// MCP protocol version.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name.
pub const SERVER_NAME: &str = "anki-mcp";

/// Server version.
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP server state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialization.
    Uninitialized,
    /// Server is initialized and ready.
    Ready,
    /// Server is shutting down.
    ShuttingDown,
}

/// MCP server for Anki.
pub struct McpServer {
    state: Arc<RwLock<ServerState>>,
    backend: Arc<dyn AnkiBackend>,
    tools: Arc<ToolRegistry>,
}

impl McpServer {
    /// Create a server talking to AnkiConnect at the configured URL.
    ///
    /// The client is wrapped in a [`GuardedBackend`] so undecodable
    /// responses never abort a request.
    pub fn connect(config: Config) -> Self {
        let client = AnkiConnectClient::new(config.anki_connect_url.clone());
        Self::new(Arc::new(GuardedBackend::new(client)), config)
    }

    /// Create a server over an arbitrary backend.
    pub fn new(backend: Arc<dyn AnkiBackend>, config: Config) -> Self {
        Self {
            state: Arc::new(RwLock::new(ServerState::Uninitialized)),
            tools: Arc::new(ToolRegistry::new(backend.clone(), config)),
            backend,
        }
    }

    /// Check that Anki answers. Failure is only logged.
    pub async fn probe_backend(&self) -> bool {
        match self.backend.version().await {
            Ok(version) => {
                tracing::info!("Connected to AnkiConnect (API v{})", version);
                true
            }
            Err(e) => {
                tracing::warn!(
                    "AnkiConnect is not reachable ({}); is Anki running with the AnkiConnect add-on?",
                    e
                );
                false
            }
        }
    }

    /// Run the server on stdio.
    pub async fn run_stdio(&self) -> Result<()> {
        let stdin = std::io::stdin();
        self.run(BufReader::new(stdin.lock()), std::io::stdout()).await
    }

    /// Serve line-delimited JSON-RPC from `reader`, answering on `writer`.
    ///
    /// `writer` is wrapped in a [`GuardedWriter`]; only envelopes reach it.
    pub async fn run<R: BufRead, W: Write>(&self, reader: R, writer: W) -> Result<()> {
        let mut out = GuardedWriter::new(writer);

        tracing::info!("MCP server starting on stdio");

        for line in reader.lines() {
            let line = line?;

            if line.trim().is_empty() {
                continue;
            }

            tracing::debug!("Received: {}", line);

            let response = self.handle_message(&line).await;

            if let Some(response) = response {
                let mut json = serde_json::to_string(&response)?;
                tracing::debug!("Sending: {}", json);
                json.push('\n');
                out.write_all(json.as_bytes())?;
                out.flush()?;
            }

            // Check if we should exit
            if *self.state.read().await == ServerState::ShuttingDown {
                break;
            }
        }

        tracing::info!("MCP server shutting down");
        Ok(())
    }

    /// Handle an incoming message.
    pub async fn handle_message(&self, json: &str) -> Option<JsonRpcResponse> {
        match McpMessage::parse(json) {
            Ok(McpMessage::Request(request)) => Some(self.handle_request(request).await),
            Ok(McpMessage::Notification(notification)) => {
                self.handle_notification(notification).await;
                None
            }
            Ok(McpMessage::Response(_)) => {
                // We don't expect responses in this direction
                None
            }
            Err(e) => Some(JsonRpcResponse::error(
                None,
                codes::PARSE_ERROR,
                e.to_string(),
            )),
        }
    }

    /// Handle a JSON-RPC request.
    async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();

        match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params).await,
            "resources/list" => self.handle_resources_list(id).await,
            "resources/read" => self.handle_resources_read(id, request.params).await,
            "tools/list" => self.handle_tools_list(id).await,
            "tools/call" => self.handle_tools_call(id, request.params).await,
            "ping" => JsonRpcResponse::success(id, serde_json::json!({})),
            "shutdown" => {
                *self.state.write().await = ServerState::ShuttingDown;
                JsonRpcResponse::success(id, serde_json::json!({}))
            }
            _ => JsonRpcResponse::error(
                id,
                codes::METHOD_NOT_FOUND,
                format!("method not found: {}", request.method),
            ),
        }
    }

    /// Handle a notification (no response expected).
    async fn handle_notification(&self, notification: JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" => {
                tracing::info!("Client initialized");
            }
            "notifications/cancelled" => {
                tracing::debug!("Request cancelled by client");
            }
            "exit" => {
                *self.state.write().await = ServerState::ShuttingDown;
            }
            _ => {
                tracing::debug!("Unknown notification: {}", notification.method);
            }
        }
    }

    /// Handle initialize request.
    async fn handle_initialize(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        let params: InitializeParams = match parse_params(&id, params, "initialize") {
            Ok(params) => params,
            Err(response) => return response,
        };
        tracing::info!(
            "Initializing for {} {} (protocol {})",
            params.client_info.name,
            params.client_info.version,
            params.protocol_version
        );

        *self.state.write().await = ServerState::Ready;

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                resources: Some(ResourcesCapability {
                    subscribe: false,
                    list_changed: false,
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.into(),
                version: SERVER_VERSION.into(),
            },
        };

        JsonRpcResponse::success(id, result)
    }

    async fn require_ready(&self, id: &Option<JsonRpcId>) -> Option<JsonRpcResponse> {
        if *self.state.read().await == ServerState::Ready {
            None
        } else {
            Some(JsonRpcResponse::error(
                id.clone(),
                codes::INTERNAL_ERROR,
                "server not initialized",
            ))
        }
    }

    /// Handle resources/list request.
    async fn handle_resources_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        if let Some(response) = self.require_ready(&id).await {
            return response;
        }

        let result = ListResourcesResult {
            resources: list_resources(),
        };

        JsonRpcResponse::success(id, result)
    }

    /// Handle resources/read request.
    async fn handle_resources_read(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        if let Some(response) = self.require_ready(&id).await {
            return response;
        }

        let params: ReadResourceParams = match parse_params(&id, params, "resource read") {
            Ok(params) => params,
            Err(response) => return response,
        };

        match read_resource(self.backend.as_ref(), &params.uri).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::error!("Reading {} failed: {}", params.uri, e);
                JsonRpcResponse::error(id, e.code(), e.to_string())
            }
        }
    }

    /// Handle tools/list request.
    async fn handle_tools_list(&self, id: Option<JsonRpcId>) -> JsonRpcResponse {
        if let Some(response) = self.require_ready(&id).await {
            return response;
        }

        let tools = self.tools.list_tools();
        let result = ListToolsResult { tools };

        JsonRpcResponse::success(id, result)
    }

    /// Handle tools/call request.
    async fn handle_tools_call(
        &self,
        id: Option<JsonRpcId>,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        if let Some(response) = self.require_ready(&id).await {
            return response;
        }

        let params: ToolCallParams = match parse_params(&id, params, "tool call") {
            Ok(params) => params,
            Err(response) => return response,
        };

        match self.tools.execute(&params.name, params.arguments).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => {
                tracing::error!("Tool {} failed: {}", params.name, e);
                JsonRpcResponse::error(id, e.code(), e.to_string())
            }
        }
    }
}

/// Decode request params, or build the error response for them.
fn parse_params<T: DeserializeOwned>(
    id: &Option<JsonRpcId>,
    params: Option<serde_json::Value>,
    what: &str,
) -> std::result::Result<T, JsonRpcResponse> {
    match params {
        Some(p) => serde_json::from_value(p).map_err(|e| {
            JsonRpcResponse::error(
                id.clone(),
                codes::INVALID_PARAMS,
                format!("invalid {} params: {}", what, e),
            )
        }),
        None => Err(JsonRpcResponse::error(
            id.clone(),
            codes::INVALID_PARAMS,
            format!("{} params required", what),
        )),
    }
}
