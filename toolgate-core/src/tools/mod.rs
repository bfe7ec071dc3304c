//! Tool data model
//!
//! The types every other layer speaks in:
//! - [`ToolContract`]: validated, immutable capability and policy declaration
//! - [`ToolCall`]: one invocation request from an agent
//! - [`ToolResult`]: the terminal outcome, with the [`ErrorKind`] taxonomy
//!
//! # Example
//!
//! ```rust
//! use toolgate_core::tools::{RiskTier, ToolCall, ToolContract};
//! use serde_json::json;
//!
//! let contract = ToolContract::builder("calculator", "Basic arithmetic")
//!     .risk(RiskTier::Read)
//!     .input_schema(json!({
//!         "type": "object",
//!         "properties": {"a": {"type": "number"}, "b": {"type": "number"}},
//!         "required": ["a", "b"]
//!     }))
//!     .build()
//!     .unwrap();
//!
//! let call = ToolCall::new(contract.name()).with_arg("a", 2).with_arg("b", 3);
//! assert_eq!(call.budget_key(), "default");
//! ```

mod call;
mod contract;
mod result;
pub mod schema;

pub use call::{DEFAULT_BUDGET_KEY, ToolCall, TraceContext};
pub use contract::{
    Constraints, ContractBuilder, ContractSpec, DEFAULT_CONTRACT_VERSION, DataHandling,
    Idempotency, Permissions, RiskTier, ToolContract,
};
pub use result::{ErrorKind, ErrorSource, ToolError, ToolResult, ToolStatus};

#[cfg(test)]
mod tests;
