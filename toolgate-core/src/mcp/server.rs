//! MCP Server Implementation
//!
//! Serves the tools of any [`Provider`] over the MCP tool methods. Each tool
//! description carries its full contract under `annotations.contract`, so a
//! [`RemoteProvider`](crate::providers::RemoteProvider) on the other side
//! recovers the exact policy declarations.

use super::protocol::*;
use crate::providers::{Provider, ProviderContext, ProviderError, ProviderOutput};
use serde_json::{Value, json};
use std::sync::Arc;

/// MCP Server configuration
#[derive(Debug, Clone)]
pub struct ToolServerConfig {
    /// Server name
    pub name: String,
    /// Server version
    pub version: String,
    /// Tool allowlist (None = expose every tool)
    pub tool_allowlist: Option<Vec<String>>,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            name: "toolgate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            tool_allowlist: None,
        }
    }
}

/// JSON-RPC front end for a provider
pub struct ToolServer {
    config: ToolServerConfig,
    provider: Arc<dyn Provider>,
}

impl std::fmt::Debug for ToolServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolServer")
            .field("config", &self.config)
            .field("provider", &self.provider.id())
            .finish()
    }
}

impl ToolServer {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self::with_config(provider, ToolServerConfig::default())
    }

    pub fn with_config(provider: Arc<dyn Provider>, config: ToolServerConfig) -> Self {
        Self { config, provider }
    }

    fn exposes(&self, name: &str) -> bool {
        self.config
            .tool_allowlist
            .as_ref()
            .is_none_or(|allowlist| allowlist.iter().any(|t| t == name))
    }

    /// Handle an incoming JSON-RPC request
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request),
            "tools/list" => self.handle_tools_list(request).await,
            "tools/call" => self.handle_tools_call(request).await,
            _ => JsonRpcResponse::error(request.id, JsonRpcError::method_not_found()),
        }
    }

    fn handle_initialize(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        if let Some(params) = request.params
            && let Err(e) = serde_json::from_value::<InitializeParams>(params)
        {
            return JsonRpcResponse::error(
                request.id,
                JsonRpcError::invalid_params(format!("Invalid initialize params: {e}")),
            );
        }

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability { list_changed: false }),
            },
            server_info: ServerInfo {
                name: self.config.name.clone(),
                version: self.config.version.clone(),
            },
        };
        JsonRpcResponse::success(request.id, serde_json::to_value(result).unwrap_or_default())
    }

    async fn handle_tools_list(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let contracts = match self.provider.list_tools(&ProviderContext::new()).await {
            Ok(contracts) => contracts,
            Err(e) => {
                tracing::warn!(provider = %self.provider.id(), error = %e, "Tool listing failed");
                return JsonRpcResponse::error(request.id, JsonRpcError::internal_error(e.to_string()));
            }
        };

        let tools = contracts
            .iter()
            .filter(|c| self.exposes(c.name()))
            .map(|c| McpTool {
                name: c.name().to_string(),
                description: c.description().to_string(),
                input_schema: c.input_schema().clone(),
                annotations: Some(json!({ CONTRACT_ANNOTATION: c.to_dict() })),
            })
            .collect();

        JsonRpcResponse::success(
            request.id,
            serde_json::to_value(ToolsListResult { tools }).unwrap_or_default(),
        )
    }

    async fn handle_tools_call(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let params: ToolCallParams = match request.params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params(format!("Invalid tool call params: {e}")),
                );
            }
            None => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("Missing tool call params"),
                );
            }
        };

        if !self.exposes(&params.name) {
            return JsonRpcResponse::error(request.id, JsonRpcError::tool_not_found(&params.name));
        }

        let arguments = match params.arguments {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            _ => {
                return JsonRpcResponse::error(
                    request.id,
                    JsonRpcError::invalid_params("arguments must be an object"),
                );
            }
        };

        let result = match self
            .provider
            .execute(&ProviderContext::new(), &params.name, arguments)
            .await
        {
            Ok(output) => call_result(output),
            Err(ProviderError::ToolNotFound(name)) => {
                return JsonRpcResponse::error(request.id, JsonRpcError::tool_not_found(&name));
            }
            Err(ProviderError::InvalidArguments(message)) => {
                return JsonRpcResponse::error(request.id, JsonRpcError::invalid_params(message));
            }
            Err(e) => ToolCallResult {
                content: vec![ContentBlock::text(format!("Error: {e}"))],
                structured_content: None,
                is_error: Some(true),
            },
        };

        JsonRpcResponse::success(request.id, serde_json::to_value(result).unwrap_or_default())
    }
}

fn call_result(output: ProviderOutput) -> ToolCallResult {
    let result = output.into_result();
    match (result.is_success(), result.error) {
        (true, _) => ToolCallResult {
            content: vec![ContentBlock::text(result.output.to_string())],
            structured_content: Some(result.output),
            is_error: None,
        },
        (false, error) => {
            let message = error
                .map(|e| e.message)
                .unwrap_or_else(|| result.status.to_string());
            ToolCallResult {
                content: vec![ContentBlock::text(format!("Error: {message}"))],
                structured_content: None,
                is_error: Some(true),
            }
        }
    }
}
