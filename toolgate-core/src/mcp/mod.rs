//! Model Context Protocol (MCP) plumbing
//!
//! JSON-RPC 2.0 types for the MCP tool methods, client transports used by
//! [`RemoteProvider`](crate::providers::RemoteProvider), and a
//! [`ToolServer`] that exposes any provider to remote gateways.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolgate_core::mcp::{MemoryTransport, ToolServer};
//! use toolgate_core::providers::{NativeProvider, RemoteProvider, builtin::Calculator};
//!
//! # fn main() -> toolgate_core::Result<()> {
//! let native = NativeProvider::new("native").with_tool(Calculator::new()?)?;
//! let server = Arc::new(ToolServer::new(Arc::new(native)));
//! let remote = RemoteProvider::new("loopback", Arc::new(MemoryTransport::loopback(server)));
//! # Ok(())
//! # }
//! ```
//!
//! # Protocol Overview
//!
//! - `initialize` - Connection setup
//! - `tools/list` - List available tools
//! - `tools/call` - Call a tool
//!
//! # References
//!
//! - [MCP Specification](https://modelcontextprotocol.io/specification)

mod protocol;
mod server;
mod transport;

pub use protocol::*;
pub use server::{ToolServer, ToolServerConfig};
pub use transport::{HttpTransport, McpTransportError, MemoryTransport, Transport};
