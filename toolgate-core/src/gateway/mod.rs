//! Tool invocation gateway
//!
//! [`Gateway::execute`] is the single entry point for agent tool calls. Each
//! call goes through, in order:
//!
//! 1. allowlist
//! 2. budget (checked; the call is counted only once every guard passes)
//! 3. resolution to a provider and contract
//! 4. read-only / risk
//! 5. required scopes
//! 6. path confinement
//! 7. input schema
//!
//! The first failing guard ends the call with a blocked result; the provider
//! is never reached and nothing is counted against the budget. Calls that
//! pass take a budget slot atomically, then are dispatched under their effective timeout, their output is checked
//! against the contract's output schema, and the result is stamped and
//! audited.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use toolgate_core::gateway::Gateway;
//! use toolgate_core::providers::{NativeProvider, builtin::Calculator};
//! use toolgate_core::tools::ToolCall;
//!
//! # async fn run() -> toolgate_core::Result<()> {
//! let native = NativeProvider::new("native").with_tool(Calculator::new()?)?;
//! let gateway = Gateway::builder()
//!     .allow("calculator")
//!     .max_tool_calls(20)
//!     .provider(Arc::new(native))
//!     .build()?;
//!
//! let call = ToolCall::new("calculator")
//!     .with_arg("operation", "add")
//!     .with_arg("a", 2)
//!     .with_arg("b", 3);
//! let result = gateway.execute(call).await;
//! assert_eq!(result.value(), Some(&serde_json::json!(5)));
//! # Ok(())
//! # }
//! ```

mod audit;
mod dispatch;
mod policy;
mod resolver;

pub use audit::{
    AuditAttrs, AuditEvent, AuditEventType, AuditSink, Auditor, ChannelAuditSink,
    CompositeAuditSink, MemoryAuditSink, REDACTED, RedactionPolicy, Severity, TracingAuditSink,
    audit_channel,
};
pub use dispatch::{dispatch, effective_timeout};
pub use policy::{PolicyDecision, PolicyPipeline};
pub use resolver::{CollisionPolicy, ResolvedTool, Resolver};

use crate::config::{GatewayConfig, RemoteServerConfig};
use crate::error::Result;
use crate::providers::{Provider, RemoteProvider};
use crate::tools::{ToolCall, ToolContract, ToolError, ToolResult};
use serde_json::Value;
use std::sync::Arc;
use tokio::time::Instant;

/// Metadata key holding the guard decisions for a call
pub const POLICY_DECISIONS_KEY: &str = "policy_decisions";

/// A call stopped before dispatch
struct Blocked {
    contract: Option<Arc<ToolContract>>,
    error: ToolError,
}

impl Blocked {
    fn before_resolution(error: ToolError) -> Self {
        Self {
            contract: None,
            error,
        }
    }
}

/// The tool invocation gateway
pub struct Gateway {
    resolver: Resolver,
    policy: PolicyPipeline,
    auditor: Auditor,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field(
                "providers",
                &self
                    .resolver
                    .providers()
                    .iter()
                    .map(|p| p.id())
                    .collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .finish()
    }
}

impl Gateway {
    pub fn builder() -> GatewayBuilder {
        GatewayBuilder::new()
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn policy(&self) -> &PolicyPipeline {
        &self.policy
    }

    /// Calls admitted so far under a budget key
    pub fn budget_used(&self, budget_key: &str) -> u64 {
        self.policy.budget_used(budget_key)
    }

    /// Forget resolved tools; providers are listed again on the next call
    pub async fn invalidate_tools(&self) {
        self.resolver.invalidate().await;
    }

    /// Contracts of allowlisted, resolvable tools, sorted by name
    pub async fn list_tools(&self) -> Vec<Arc<ToolContract>> {
        let mut contracts: Vec<_> = self
            .resolver
            .contracts()
            .await
            .into_iter()
            .filter(|c| self.policy.is_allowlisted(c.name()))
            .collect();
        contracts.sort_by(|a, b| a.name().cmp(b.name()));
        contracts
    }

    /// Execute one call. Never panics; every failure is a result.
    pub async fn execute(&self, mut call: ToolCall) -> ToolResult {
        call.ensure_id();
        let started = Instant::now();
        let mut decisions = Vec::new();

        let tool = match self.admit(&call, &mut decisions).await {
            Ok(tool) => tool,
            Err(blocked) => {
                let reason = if self.auditor.redacts(blocked.contract.as_deref()) {
                    REDACTED
                } else {
                    blocked.error.message.as_str()
                };
                tracing::warn!(
                    tool_name = %call.tool_name,
                    tool_call_id = %call.tool_call_id,
                    error_type = blocked.error.kind.as_str(),
                    reason,
                    "Tool call blocked"
                );
                let result = stamp(
                    ToolResult::failure(blocked.error).with_duration(started.elapsed()),
                    &call,
                    blocked.contract.as_deref(),
                    decisions,
                );
                self.auditor
                    .blocked(&call, blocked.contract.as_deref(), &result)
                    .await;
                return result;
            }
        };
        let contract = tool.contract.as_ref();

        self.auditor.started(&call, contract).await;
        let timeout = effective_timeout(&call, contract);
        tracing::debug!(
            tool_name = %call.tool_name,
            tool_call_id = %call.tool_call_id,
            provider = %tool.provider.id(),
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Dispatching tool call"
        );

        let mut result = dispatch(tool.provider.as_ref(), &call, timeout).await;
        if result.is_success()
            && let Err(violations) = contract.validate_output(&result.output)
        {
            tracing::warn!(
                tool_name = %call.tool_name,
                tool_call_id = %call.tool_call_id,
                "Tool output does not match its output schema"
            );
            let duration_ms = result.duration_ms;
            result = ToolResult::failure(ToolError::result_invalid(violations));
            result.duration_ms = duration_ms;
        }

        let result = stamp(result, &call, Some(contract), decisions);
        self.auditor.finished(&call, contract, &result).await;
        result
    }

    /// Execute calls one after another, in order
    ///
    /// A failed call does not stop the batch.
    pub async fn execute_batch(&self, calls: Vec<ToolCall>) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call).await);
        }
        results
    }

    /// Run every guard; on success the call is counted against its budget
    async fn admit(
        &self,
        call: &ToolCall,
        decisions: &mut Vec<PolicyDecision>,
    ) -> std::result::Result<ResolvedTool, Blocked> {
        record(decisions, "allowlist", self.policy.check_allowlist(&call.tool_name))
            .map_err(Blocked::before_resolution)?;

        record(decisions, "budget", self.policy.check_budget(call.budget_key()))
            .map_err(Blocked::before_resolution)?;

        let Some(tool) = self.resolver.resolve(&call.tool_name).await else {
            let error = ToolError::not_found(&call.tool_name);
            decisions.push(PolicyDecision::new("resolve", false).with_reason(&error.message));
            return Err(Blocked::before_resolution(error));
        };
        decisions.push(PolicyDecision::new("resolve", true));

        let contract = tool.contract.as_ref();
        let blocked = |error: ToolError| Blocked {
            contract: Some(Arc::clone(&tool.contract)),
            error,
        };
        record(decisions, "risk", self.policy.check_risk(contract)).map_err(blocked)?;
        record(decisions, "scopes", self.policy.check_scopes(contract, call)).map_err(blocked)?;
        let paths = self.policy.check_paths(contract, &call.arguments).await;
        record(decisions, "paths", paths).map_err(blocked)?;
        record(decisions, "input", self.policy.check_input(contract, &call.arguments))
            .map_err(blocked)?;

        if let Err(error) = self.policy.consume_budget(call.budget_key()) {
            decisions.push(PolicyDecision::new("budget", false).with_reason(&error.message));
            return Err(blocked(error));
        }
        Ok(tool)
    }
}

fn record(
    decisions: &mut Vec<PolicyDecision>,
    check: &str,
    outcome: std::result::Result<(), ToolError>,
) -> std::result::Result<(), ToolError> {
    let decision = match &outcome {
        Ok(()) => PolicyDecision::new(check, true),
        Err(error) => PolicyDecision::new(check, false).with_reason(&error.message),
    };
    decisions.push(decision);
    outcome
}

/// Merge call identity and contract version into a terminal result
fn stamp(
    mut result: ToolResult,
    call: &ToolCall,
    contract: Option<&ToolContract>,
    decisions: Vec<PolicyDecision>,
) -> ToolResult {
    result.tool_call_id = call.tool_call_id.clone();
    result.tool_name = call.tool_name.clone();
    result.trace = call.trace.clone();
    if let Some(contract) = contract {
        result
            .metadata
            .insert("tool_version".to_string(), Value::String(contract.version().to_string()));
    }
    if let Ok(decisions) = serde_json::to_value(decisions) {
        result
            .metadata
            .insert(POLICY_DECISIONS_KEY.to_string(), decisions);
    }
    result
}

/// Builder for [`Gateway`]
pub struct GatewayBuilder {
    allowlist: Vec<String>,
    read_only: bool,
    max_tool_calls: u64,
    redaction: RedactionPolicy,
    collision: CollisionPolicy,
    providers: Vec<Arc<dyn Provider>>,
    remote: Vec<RemoteServerConfig>,
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayBuilder {
    /// Builder with nothing allowlisted and no providers
    pub fn new() -> Self {
        Self {
            allowlist: Vec::new(),
            read_only: false,
            max_tool_calls: 0,
            redaction: RedactionPolicy::default(),
            collision: CollisionPolicy::default(),
            providers: Vec::new(),
            remote: Vec::new(),
            sinks: Vec::new(),
        }
    }

    /// Apply a loaded configuration
    pub fn with_config(mut self, config: &GatewayConfig) -> Self {
        self.allowlist = config.allowlist.clone();
        self.read_only = config.policies.read_only;
        self.max_tool_calls = config.policies.budgets.max_tool_calls;
        self.redaction = config.observability.redact;
        self.collision = config.resolver.collision;
        self.remote = config.remote.clone();
        self
    }

    /// Replace the allowlist
    pub fn allowlist<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowlist = names.into_iter().map(Into::into).collect();
        self
    }

    /// Add one tool to the allowlist
    pub fn allow(mut self, name: impl Into<String>) -> Self {
        self.allowlist.push(name.into());
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Calls allowed per budget key; 0 means unlimited
    pub fn max_tool_calls(mut self, max_tool_calls: u64) -> Self {
        self.max_tool_calls = max_tool_calls;
        self
    }

    pub fn redact(mut self, redaction: RedactionPolicy) -> Self {
        self.redaction = redaction;
        self
    }

    pub fn collision_policy(mut self, collision: CollisionPolicy) -> Self {
        self.collision = collision;
        self
    }

    /// Register a provider; earlier providers win name collisions
    pub fn provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn remote(mut self, remote: RemoteServerConfig) -> Self {
        self.remote.push(remote);
        self
    }

    /// Add an audit sink; with none, events go to the log
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn build(self) -> Result<Gateway> {
        let mut providers = self.providers;
        for remote in &self.remote {
            providers.push(Arc::new(RemoteProvider::from_config(remote)?));
        }

        let sink: Arc<dyn AuditSink> = match self.sinks.len() {
            0 => Arc::new(TracingAuditSink),
            1 => self
                .sinks
                .into_iter()
                .next()
                .unwrap_or_else(|| Arc::new(TracingAuditSink)),
            _ => Arc::new(
                self.sinks
                    .into_iter()
                    .fold(CompositeAuditSink::new(), |composite, sink| composite.with(sink)),
            ),
        };

        tracing::debug!(
            providers = providers.len(),
            allowlisted = self.allowlist.len(),
            read_only = self.read_only,
            max_tool_calls = self.max_tool_calls,
            "Gateway built"
        );

        Ok(Gateway {
            resolver: Resolver::new(providers, self.collision),
            policy: PolicyPipeline::new(self.allowlist, self.read_only, self.max_tool_calls),
            auditor: Auditor::new(sink, self.redaction),
        })
    }
}

#[cfg(test)]
mod tests;
