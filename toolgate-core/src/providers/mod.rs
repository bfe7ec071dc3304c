//! Tool providers
//!
//! A [`Provider`] is a backend that can list tool contracts and execute tools
//! by name. The gateway depends only on this trait; three backends ship with
//! the crate:
//! - [`NativeProvider`]: in-process Rust tools
//! - [`FixtureProvider`]: deterministic replay of recorded results
//! - [`RemoteProvider`]: MCP-style tool servers over JSON-RPC

pub mod builtin;
mod fixture;
mod native;
mod remote;

pub use fixture::{
    FIXTURE_SCHEMA_VERSION, FixtureEntry, FixtureKey, FixtureProvider, FixtureSet,
    RecordingProvider, args_sha256, canonical_json,
};
pub use native::{FnTool, NativeProvider, NativeTool};
pub use remote::RemoteProvider;

use crate::tools::{ErrorKind, ToolCall, ToolContract, ToolError, ToolResult, TraceContext};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Context handed to a provider for one operation
#[derive(Debug, Clone, Default)]
pub struct ProviderContext {
    /// Id of the call being executed
    pub tool_call_id: Option<String>,

    pub run_id: Option<String>,

    pub trace: Option<TraceContext>,

    /// Effective timeout the gateway enforces, if any
    pub timeout: Option<Duration>,

    /// Cancelled when the gateway gives up on the call
    pub cancellation: CancellationToken,
}

impl ProviderContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for executing `call`
    pub fn for_call(call: &ToolCall) -> Self {
        Self {
            tool_call_id: Some(call.tool_call_id.clone()),
            run_id: call.run_id.clone(),
            trace: call.trace.clone(),
            timeout: None,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// What a provider returns from a successful execution
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutput {
    /// A complete result, passed through by the gateway
    Result(ToolResult),
    /// A bare output value, wrapped as a success
    Value(Value),
}

impl From<Value> for ProviderOutput {
    fn from(value: Value) -> Self {
        ProviderOutput::Value(value)
    }
}

impl From<ToolResult> for ProviderOutput {
    fn from(result: ToolResult) -> Self {
        ProviderOutput::Result(result)
    }
}

impl ProviderOutput {
    pub fn into_result(self) -> ToolResult {
        match self {
            ProviderOutput::Result(result) => result,
            ProviderOutput::Value(value) => ToolResult::success(value),
        }
    }
}

/// Errors at the provider boundary
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("tool '{0}' not found")]
    ToolNotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("no fixture for {tool}@{version} (args sha256 {args_sha256})")]
    FixtureNotFound {
        tool: String,
        version: String,
        args_sha256: String,
    },

    /// Backend unreachable; worth retrying
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    /// Map into the gateway error taxonomy
    pub fn into_tool_error(self) -> ToolError {
        let message = self.to_string();
        match self {
            ProviderError::ToolNotFound(_) => ToolError::new(ErrorKind::ToolNotFound, message),
            ProviderError::InvalidArguments(_) => {
                ToolError::new(ErrorKind::ToolInputInvalid, message)
            }
            ProviderError::FixtureNotFound {
                tool,
                version,
                args_sha256,
            } => ToolError::provider(message).with_details(serde_json::json!({
                "reason": "fixture_not_found",
                "tool_name": tool,
                "tool_version": version,
                "args_sha256": args_sha256,
            })),
            ProviderError::Connect(_) => ToolError::provider(message).with_retryable(true),
            ProviderError::Execution(_) | ProviderError::Cancelled => ToolError::provider(message),
        }
    }
}

impl From<anyhow::Error> for ProviderError {
    fn from(err: anyhow::Error) -> Self {
        ProviderError::Execution(format!("{err:#}"))
    }
}

impl From<crate::mcp::McpTransportError> for ProviderError {
    fn from(err: crate::mcp::McpTransportError) -> Self {
        if err.is_connect() {
            ProviderError::Connect(err.to_string())
        } else {
            ProviderError::Execution(err.to_string())
        }
    }
}

/// A backend that exposes tools
///
/// Implementations may perform I/O. `execute` runs under the gateway's
/// timeout; when it fires the future is dropped and `ctx.cancellation` is
/// cancelled. Work spawned outside the future that ignores the token keeps
/// running.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier for logs
    fn id(&self) -> &str;

    /// Contracts of every tool this provider exposes
    async fn list_tools(&self, ctx: &ProviderContext) -> Result<Vec<ToolContract>, ProviderError>;

    /// Execute the named tool
    async fn execute(
        &self,
        ctx: &ProviderContext,
        name: &str,
        args: Map<String, Value>,
    ) -> Result<ProviderOutput, ProviderError>;
}
