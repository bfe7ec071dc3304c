//! Tool results and the error taxonomy
//!
//! Every call through the gateway terminates in a [`ToolResult`]. Failures are
//! values: callers branch on [`ToolResult::status`] and on the error's
//! [`ErrorSource`] rather than on panics or `Err` returns.

use crate::tools::TraceContext;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// Terminal status of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    Failure,
    Timeout,
    InvalidInput,
    NotFound,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Success => "success",
            ToolStatus::Failure => "failure",
            ToolStatus::Timeout => "timeout",
            ToolStatus::InvalidInput => "invalid_input",
            ToolStatus::NotFound => "not_found",
        }
    }
}

impl std::fmt::Display for ToolStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which layer rejected the call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSource {
    Tool,
    Policy,
}

/// Error taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// No provider exposes the tool
    ToolNotFound,
    /// Arguments do not match the input schema
    ToolInputInvalid,
    /// Execution exceeded its timeout
    ToolTimeout,
    /// The backend failed
    ToolProviderError,
    /// Output does not match the output schema
    ToolResultInvalid,
    /// A policy guard rejected the call
    PolicyViolation,
    /// The run exhausted its call budget
    BudgetExceeded,
}

impl ErrorKind {
    /// Status a result carrying this error has
    pub fn status(&self) -> ToolStatus {
        match self {
            ErrorKind::ToolNotFound => ToolStatus::NotFound,
            ErrorKind::ToolInputInvalid => ToolStatus::InvalidInput,
            ErrorKind::ToolTimeout => ToolStatus::Timeout,
            ErrorKind::ToolProviderError
            | ErrorKind::ToolResultInvalid
            | ErrorKind::PolicyViolation
            | ErrorKind::BudgetExceeded => ToolStatus::Failure,
        }
    }

    pub fn source(&self) -> ErrorSource {
        match self {
            ErrorKind::PolicyViolation | ErrorKind::BudgetExceeded => ErrorSource::Policy,
            _ => ErrorSource::Tool,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ToolNotFound => "ToolNotFound",
            ErrorKind::ToolInputInvalid => "ToolInputInvalid",
            ErrorKind::ToolTimeout => "ToolTimeout",
            ErrorKind::ToolProviderError => "ToolProviderError",
            ErrorKind::ToolResultInvalid => "ToolResultInvalid",
            ErrorKind::PolicyViolation => "PolicyViolation",
            ErrorKind::BudgetExceeded => "BudgetExceeded",
        }
    }
}

/// Structured error attached to a non-success result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolError {
    #[serde(rename = "type")]
    pub kind: ErrorKind,

    pub message: String,

    #[serde(default)]
    pub retryable: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,

    pub source: ErrorSource,
}

impl ToolError {
    /// Non-retryable error of `kind`
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: false,
            details: None,
            source: kind.source(),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn not_found(tool_name: &str) -> Self {
        Self::new(ErrorKind::ToolNotFound, format!("tool '{tool_name}' not found"))
    }

    pub fn input_invalid(violations: Vec<String>) -> Self {
        Self::new(
            ErrorKind::ToolInputInvalid,
            format!("invalid arguments: {}", violations.join("; ")),
        )
        .with_details(serde_json::json!({ "violations": violations }))
    }

    pub fn result_invalid(violations: Vec<String>) -> Self {
        Self::new(
            ErrorKind::ToolResultInvalid,
            format!("output does not match schema: {}", violations.join("; ")),
        )
        .with_details(serde_json::json!({ "violations": violations }))
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            ErrorKind::ToolTimeout,
            format!("tool execution timed out after {}ms", limit.as_millis()),
        )
        .with_details(serde_json::json!({ "timeout_ms": limit.as_millis() as u64 }))
    }

    pub fn provider(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ToolProviderError, message)
    }

    pub fn policy(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PolicyViolation, message)
    }

    pub fn budget_exceeded(budget_key: &str, limit: u64) -> Self {
        Self::new(
            ErrorKind::BudgetExceeded,
            format!("budget '{budget_key}' exhausted ({limit} tool calls)"),
        )
        .with_details(serde_json::json!({
            "budget_key": budget_key,
            "max_tool_calls": limit,
        }))
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for ToolError {}

/// Outcome of a tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub status: ToolStatus,

    #[serde(default)]
    pub output: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,

    #[serde(default)]
    pub duration_ms: u64,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default)]
    pub tool_call_id: String,

    #[serde(default)]
    pub tool_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,

    pub timestamp: DateTime<Utc>,
}

impl ToolResult {
    /// Successful result carrying `output`
    pub fn success(output: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            output,
            error: None,
            duration_ms: 0,
            metadata: Map::new(),
            tool_call_id: String::new(),
            tool_name: String::new(),
            trace: None,
            timestamp: Utc::now(),
        }
    }

    /// Failed result; status follows the error kind
    pub fn failure(error: ToolError) -> Self {
        Self {
            status: error.kind.status(),
            output: Value::Null,
            error: Some(error),
            duration_ms: 0,
            metadata: Map::new(),
            tool_call_id: String::new(),
            tool_name: String::new(),
            trace: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Output if successful
    pub fn value(&self) -> Option<&Value> {
        self.is_success().then_some(&self.output)
    }

    pub fn get_error(&self) -> Option<&ToolError> {
        self.error.as_ref()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self
    }
}
