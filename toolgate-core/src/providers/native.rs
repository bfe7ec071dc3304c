//! In-process tools

use super::{Provider, ProviderContext, ProviderError, ProviderOutput};
use crate::error::{GatewayError, Result};
use crate::tools::ToolContract;
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// A tool implemented in Rust
///
/// Each tool owns its contract. The gateway has validated the arguments
/// against the contract's input schema before `call` runs.
#[async_trait]
pub trait NativeTool: Send + Sync {
    fn contract(&self) -> &ToolContract;

    async fn call(
        &self,
        ctx: &ProviderContext,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError>;
}

type Handler =
    Arc<dyn Fn(Map<String, Value>) -> BoxFuture<'static, anyhow::Result<Value>> + Send + Sync>;

/// Closure-backed tool
pub struct FnTool {
    contract: ToolContract,
    handler: Handler,
}

impl FnTool {
    /// Tool backed by an async closure
    pub fn new<F, Fut>(contract: ToolContract, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
    {
        Self {
            contract,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Tool backed by a synchronous closure
    pub fn sync<F>(contract: ToolContract, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        Self::new(contract, move |args| {
            let handler = Arc::clone(&handler);
            async move { handler(args) }
        })
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.contract.name())
            .finish()
    }
}

#[async_trait]
impl NativeTool for FnTool {
    fn contract(&self) -> &ToolContract {
        &self.contract
    }

    async fn call(
        &self,
        _ctx: &ProviderContext,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        let value = (self.handler)(args).await?;
        Ok(ProviderOutput::Value(value))
    }
}

/// Provider over a set of [`NativeTool`]s
pub struct NativeProvider {
    id: String,
    tools: Vec<Arc<dyn NativeTool>>,
    index: HashMap<String, usize>,
}

impl NativeProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool; names must be unique within the provider
    pub fn register(&mut self, tool: Arc<dyn NativeTool>) -> Result<()> {
        let name = tool.contract().name().to_string();
        if self.index.contains_key(&name) {
            return Err(GatewayError::DuplicateTool(name));
        }
        tracing::debug!(provider = %self.id, tool = %name, "Registered native tool");
        self.index.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_tool(mut self, tool: impl NativeTool + 'static) -> Result<Self> {
        self.register(Arc::new(tool))?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn NativeTool>> {
        self.index.get(name).map(|i| &self.tools[*i])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for NativeProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeProvider")
            .field("id", &self.id)
            .field("tools", &self.index.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[async_trait]
impl Provider for NativeProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn list_tools(
        &self,
        _ctx: &ProviderContext,
    ) -> std::result::Result<Vec<ToolContract>, ProviderError> {
        Ok(self.tools.iter().map(|t| t.contract().clone()).collect())
    }

    async fn execute(
        &self,
        ctx: &ProviderContext,
        name: &str,
        args: Map<String, Value>,
    ) -> std::result::Result<ProviderOutput, ProviderError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ProviderError::ToolNotFound(name.to_string()))?;
        tool.call(ctx, args).await
    }
}
