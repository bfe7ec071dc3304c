//! MCP-style remote tool servers

use super::{Provider, ProviderContext, ProviderError, ProviderOutput};
use crate::config::RemoteServerConfig;
use crate::error::{GatewayError, Result};
use crate::mcp::{
    ClientInfo, HttpTransport, InitializeParams, InitializeResult, JsonRpcError, JsonRpcRequest,
    MCP_PROTOCOL_VERSION, McpTool, ServerInfo, ToolCallParams, ToolCallResult, ToolsListResult,
    Transport,
};
use crate::tools::ToolContract;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::OnceCell;

/// Provider backed by a remote MCP tool server
pub struct RemoteProvider {
    id: String,
    transport: Arc<dyn Transport>,
    next_id: AtomicI64,
    server_info: OnceCell<ServerInfo>,
}

impl RemoteProvider {
    pub fn new(id: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            id: id.into(),
            transport,
            next_id: AtomicI64::new(1),
            server_info: OnceCell::new(),
        }
    }

    /// Remote server reached over HTTP
    pub fn http(id: impl Into<String>, url: &str, request_timeout: Duration) -> Result<Self> {
        let transport = HttpTransport::new(url, request_timeout)?;
        Ok(Self::new(id, Arc::new(transport)))
    }

    pub fn from_config(config: &RemoteServerConfig) -> Result<Self> {
        Self::http(&config.name, &config.url, config.request_timeout)
    }

    /// Server identity, once the handshake has completed
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.get()
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        tool: Option<&str>,
    ) -> std::result::Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::new(id, method).with_params(params);
        let response = self.transport.round_trip(request).await?;

        if let Some(error) = response.error {
            return Err(rpc_error(error, tool));
        }
        response.result.ok_or_else(|| {
            ProviderError::Execution(format!("{method}: response carried neither result nor error"))
        })
    }

    async fn ensure_initialized(&self) -> std::result::Result<(), ProviderError> {
        self.server_info
            .get_or_try_init(|| async {
                let params = serde_json::to_value(InitializeParams {
                    protocol_version: MCP_PROTOCOL_VERSION.to_string(),
                    capabilities: Value::Object(Map::new()),
                    client_info: ClientInfo {
                        name: "toolgate".to_string(),
                        version: crate::VERSION.to_string(),
                    },
                })
                .map_err(|e| ProviderError::Execution(e.to_string()))?;
                let result: InitializeResult =
                    serde_json::from_value(self.request("initialize", params, None).await?)
                        .map_err(|e| ProviderError::Execution(format!("initialize: {e}")))?;
                tracing::debug!(
                    provider = %self.id,
                    server = %result.server_info.name,
                    version = %result.server_info.version,
                    "Connected to MCP server"
                );
                Ok::<_, ProviderError>(result.server_info)
            })
            .await?;
        Ok(())
    }
}

impl std::fmt::Debug for RemoteProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteProvider")
            .field("id", &self.id)
            .field("server_info", &self.server_info.get())
            .finish()
    }
}

fn rpc_error(error: JsonRpcError, tool: Option<&str>) -> ProviderError {
    if error.is_method_not_found() || error.is_tool_not_found() {
        ProviderError::ToolNotFound(tool.unwrap_or(&error.message).to_string())
    } else if error.is_invalid_params() {
        ProviderError::InvalidArguments(error.message)
    } else {
        ProviderError::Execution(format!("JSON-RPC error {}: {}", error.code, error.message))
    }
}

/// Contract from the tool's annotation, or a read-risk contract derived from
/// its name, description and input schema
fn contract_from_tool(tool: &McpTool) -> Result<ToolContract> {
    if let Some(dict) = tool.contract_annotation() {
        let contract = ToolContract::from_dict(dict)?;
        if contract.name() != tool.name {
            return Err(GatewayError::invalid_contract(format!(
                "tool '{}' carries a contract named '{}'",
                tool.name,
                contract.name()
            )));
        }
        return Ok(contract);
    }

    let description = if tool.description.trim().is_empty() {
        tool.name.as_str()
    } else {
        tool.description.as_str()
    };
    let mut builder = ToolContract::builder(&tool.name, description);
    if tool.input_schema.is_object() {
        builder = builder.input_schema(tool.input_schema.clone());
    }
    builder.build()
}

/// Output value of a successful call
fn call_output(result: ToolCallResult) -> Value {
    if let Some(structured) = result.structured_content {
        return structured;
    }
    let text = result.text();
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl Provider for RemoteProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(
        &self,
        _ctx: &ProviderContext,
    ) -> std::result::Result<Vec<ToolContract>, ProviderError> {
        self.ensure_initialized().await?;
        let value = self
            .request("tools/list", Value::Object(Map::new()), None)
            .await?;
        let listed: ToolsListResult = serde_json::from_value(value)
            .map_err(|e| ProviderError::Execution(format!("tools/list: {e}")))?;

        let mut contracts = Vec::with_capacity(listed.tools.len());
        for tool in &listed.tools {
            match contract_from_tool(tool) {
                Ok(contract) => contracts.push(contract),
                Err(e) => {
                    tracing::warn!(provider = %self.id, tool = %tool.name, error = %e, "Skipping remote tool with invalid contract");
                }
            }
        }
        Ok(contracts)
    }

    async fn execute(
        &self,
        ctx: &ProviderContext,
        name: &str,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        let params = serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments: Value::Object(args),
        })
        .map_err(|e| ProviderError::Execution(e.to_string()))?;

        let call = async {
            self.ensure_initialized().await?;
            self.request("tools/call", params, Some(name)).await
        };
        let value = tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(ProviderError::Cancelled),
            value = call => value?,
        };

        let result: ToolCallResult = serde_json::from_value(value)
            .map_err(|e| ProviderError::Execution(format!("tools/call: {e}")))?;
        if result.is_error() {
            return Err(ProviderError::Execution(result.text()));
        }
        Ok(ProviderOutput::Value(call_output(result)))
    }
}
