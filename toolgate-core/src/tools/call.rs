//! Tool call requests

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Budget key used when a call carries no run id
pub const DEFAULT_BUDGET_KEY: &str = "default";

/// Distributed trace identifiers, propagated as-is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    pub trace_id: String,
    pub span_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<String>,
}

impl TraceContext {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            span_id: span_id.into(),
            parent_span_id: None,
        }
    }

    pub fn with_parent(mut self, parent_span_id: impl Into<String>) -> Self {
        self.parent_span_id = Some(parent_span_id.into());
        self
    }
}

fn new_call_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A single tool invocation issued by an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool_name: String,

    #[serde(default)]
    pub arguments: Map<String, Value>,

    #[serde(default = "new_call_id")]
    pub tool_call_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Caller-requested timeout in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,

    /// Scopes granted to this call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

impl ToolCall {
    /// New call with a generated id and no arguments
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: Map::new(),
            tool_call_id: new_call_id(),
            run_id: None,
            timeout_ms: None,
            trace: None,
            scopes: None,
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.arguments.insert(key.into(), value.into());
        self
    }

    pub fn with_arguments(mut self, arguments: Map<String, Value>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Use a caller-supplied call id
    pub fn with_id(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = tool_call_id.into();
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn with_trace(mut self, trace: TraceContext) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = Some(scopes.into_iter().map(Into::into).collect());
        self
    }

    /// Key the call is counted against for budgets
    pub fn budget_key(&self) -> &str {
        self.run_id.as_deref().unwrap_or(DEFAULT_BUDGET_KEY)
    }

    /// Caller-requested timeout, if set and non-zero
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Whether every scope in `required` was granted
    pub fn grants(&self, required: &[String]) -> bool {
        let granted = self.scopes.as_deref().unwrap_or_default();
        required.iter().all(|scope| granted.contains(scope))
    }

    /// Arguments as a JSON object value
    pub fn arguments_value(&self) -> Value {
        Value::Object(self.arguments.clone())
    }

    /// Replace a blank id with a generated one
    pub(crate) fn ensure_id(&mut self) {
        if self.tool_call_id.trim().is_empty() {
            self.tool_call_id = new_call_id();
        }
    }
}
