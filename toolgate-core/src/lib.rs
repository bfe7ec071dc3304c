//! # Toolgate - A Policy Gateway for Agent Tool Calls
//!
//! Toolgate sits between an agent loop and the tools it may call. Every call
//! is checked, dispatched and audited through a single entry point:
//! - Validated tool contracts (risk tier, schemas, scopes, permissions)
//! - Pluggable providers: in-process Rust tools, fixture replay, MCP servers
//! - Ordered policy guards with per-run call budgets
//! - Timeouts with cooperative cancellation
//! - Structured, redacted audit events
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolgate_core::prelude::*;
//! use toolgate_core::providers::builtin::Calculator;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let native = NativeProvider::new("native").with_tool(Calculator::new()?)?;
//!     let gateway = Gateway::builder()
//!         .with_config(&GatewayConfig::load()?)
//!         .provider(Arc::new(native))
//!         .build()?;
//!
//!     let result = gateway
//!         .execute(
//!             ToolCall::new("calculator")
//!                 .with_arg("operation", "add")
//!                 .with_arg("a", 2)
//!                 .with_arg("b", 3),
//!         )
//!         .await;
//!     println!("{}: {}", result.status, result.output);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! `ToolCall` → [`Gateway::execute`](gateway::Gateway::execute) → resolver →
//! policy guards → dispatcher → output check and audit → `ToolResult`.
//! Failures are values: callers branch on `status` and `error.source`.

pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod mcp;
pub mod providers;
pub mod tools;

pub use error::{GatewayError, Result};

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{GatewayConfig, RemoteServerConfig};
    pub use crate::error::{GatewayError, Result};
    pub use crate::gateway::{
        AuditEvent, AuditEventType, AuditSink, CollisionPolicy, Gateway, GatewayBuilder,
        MemoryAuditSink, RedactionPolicy,
    };
    pub use crate::logging::init_tracing;
    pub use crate::providers::{
        FixtureProvider, FixtureSet, FnTool, NativeProvider, NativeTool, Provider,
        ProviderContext, ProviderError, ProviderOutput, RecordingProvider, RemoteProvider,
    };
    pub use crate::tools::{
        ErrorKind, ErrorSource, RiskTier, ToolCall, ToolContract, ToolError, ToolResult,
        ToolStatus, TraceContext,
    };
}
