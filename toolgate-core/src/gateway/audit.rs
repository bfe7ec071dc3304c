//! Audit events for tool calls
//!
//! Every call that enters the gateway produces at least one event: `started`
//! and `finished` around dispatch, or a single `blocked` when a guard stops
//! it. Argument and output payloads, plus the error message and details that
//! may quote them, are replaced with [`REDACTED`] when the contract declares
//! sensitive data and the matching redaction switch is on.

use crate::tools::{ToolCall, ToolContract, ToolError, ToolResult, ToolStatus, TraceContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

/// Placeholder for redacted payloads
pub const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "tool.call.started")]
    Started,
    #[serde(rename = "tool.call.finished")]
    Finished,
    #[serde(rename = "tool.call.blocked")]
    Blocked,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::Started => "tool.call.started",
            AuditEventType::Finished => "tool.call.finished",
            AuditEventType::Blocked => "tool.call.blocked",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warn,
}

/// Call details carried by an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditAttrs {
    pub tool_name: String,
    pub tool_call_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ToolStatus>,

    pub arguments: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub time: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,

    /// Always `"tool"`
    pub actor: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<TraceContext>,

    pub attrs: AuditAttrs,
}

/// Destination for audit events
///
/// `emit` must not block the call path for long; sinks that forward to slow
/// consumers should buffer and drop.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: AuditEvent);
}

/// Keeps events in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events of one type, in emission order
    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.event_type == event_type)
            .collect()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn emit(&self, event: AuditEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Forwards events over a bounded channel, dropping them when it is full
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditEvent>,
}

impl ChannelAuditSink {
    pub fn new(sender: mpsc::Sender<AuditEvent>) -> Self {
        Self { sender }
    }
}

/// Channel sink plus the receiving end
pub fn audit_channel(buffer: usize) -> (ChannelAuditSink, mpsc::Receiver<AuditEvent>) {
    let (sender, receiver) = mpsc::channel(buffer.max(1));
    (ChannelAuditSink::new(sender), receiver)
}

#[async_trait]
impl AuditSink for ChannelAuditSink {
    async fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.sender.try_send(event) {
            let (reason, event) = match e {
                mpsc::error::TrySendError::Full(event) => ("channel full", event),
                mpsc::error::TrySendError::Closed(event) => ("channel closed", event),
            };
            tracing::warn!(
                reason,
                event_type = event.event_type.as_str(),
                tool_call_id = %event.attrs.tool_call_id,
                "Dropping audit event"
            );
        }
    }
}

/// Writes events to the `tracing` log stream
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn emit(&self, event: AuditEvent) {
        let status = event.attrs.status.map(|s| s.as_str()).unwrap_or("-");
        let error = event
            .attrs
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();
        match event.severity {
            Severity::Info => tracing::info!(
                target: "toolgate::audit",
                event_type = event.event_type.as_str(),
                tool_name = %event.attrs.tool_name,
                tool_call_id = %event.attrs.tool_call_id,
                run_id = event.run_id.as_deref().unwrap_or("-"),
                status,
                "Tool call"
            ),
            Severity::Warn => tracing::warn!(
                target: "toolgate::audit",
                event_type = event.event_type.as_str(),
                tool_name = %event.attrs.tool_name,
                tool_call_id = %event.attrs.tool_call_id,
                run_id = event.run_id.as_deref().unwrap_or("-"),
                status,
                error = %error,
                "Tool call"
            ),
        }
    }
}

/// Fans events out to several sinks in order
#[derive(Default, Clone)]
pub struct CompositeAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl AuditSink for CompositeAuditSink {
    async fn emit(&self, event: AuditEvent) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.emit(event.clone()).await;
            }
            last.emit(event).await;
        }
    }
}

/// Which declared data classes are redacted from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionPolicy {
    pub pii: bool,
    pub secrets: bool,
}

impl Default for RedactionPolicy {
    fn default() -> Self {
        Self {
            pii: true,
            secrets: true,
        }
    }
}

impl RedactionPolicy {
    /// Whether payloads of calls to `contract` are redacted
    pub fn applies_to(&self, contract: &ToolContract) -> bool {
        let handling = contract.data_handling();
        (handling.pii && self.pii) || (handling.secrets && self.secrets)
    }
}

/// Builds events and hands them to the sink
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
    redaction: RedactionPolicy,
}

impl Auditor {
    pub fn new(sink: Arc<dyn AuditSink>, redaction: RedactionPolicy) -> Self {
        Self { sink, redaction }
    }

    pub fn redaction(&self) -> RedactionPolicy {
        self.redaction
    }

    /// Whether payloads of calls to `contract` are kept out of events and logs
    pub fn redacts(&self, contract: Option<&ToolContract>) -> bool {
        contract.is_some_and(|c| self.redaction.applies_to(c))
    }

    pub async fn started(&self, call: &ToolCall, contract: &ToolContract) {
        let event = self.event(AuditEventType::Started, call, Some(contract), None);
        self.sink.emit(event).await;
    }

    pub async fn finished(&self, call: &ToolCall, contract: &ToolContract, result: &ToolResult) {
        let event = self.event(AuditEventType::Finished, call, Some(contract), Some(result));
        self.sink.emit(event).await;
    }

    /// A guard stopped the call; `contract` is `None` when it was never resolved
    pub async fn blocked(&self, call: &ToolCall, contract: Option<&ToolContract>, result: &ToolResult) {
        let event = self.event(AuditEventType::Blocked, call, contract, Some(result));
        self.sink.emit(event).await;
    }

    fn event(
        &self,
        event_type: AuditEventType,
        call: &ToolCall,
        contract: Option<&ToolContract>,
        result: Option<&ToolResult>,
    ) -> AuditEvent {
        let redact = self.redacts(contract);
        let payload = |value: &Value| {
            if redact {
                Value::String(REDACTED.to_string())
            } else {
                value.clone()
            }
        };

        let severity = match (event_type, result) {
            (AuditEventType::Blocked, _) => Severity::Warn,
            (_, Some(result)) if !result.is_success() => Severity::Warn,
            _ => Severity::Info,
        };

        AuditEvent {
            time: Utc::now(),
            event_type,
            severity,
            run_id: call.run_id.clone(),
            actor: "tool".to_string(),
            trace: call.trace.clone(),
            attrs: AuditAttrs {
                tool_name: call.tool_name.clone(),
                tool_call_id: call.tool_call_id.clone(),
                status: result.map(|r| r.status),
                arguments: payload(&call.arguments_value()),
                output: result
                    .filter(|r| r.is_success())
                    .map(|r| payload(&r.output)),
                error: result.and_then(|r| r.error.as_ref()).map(|error| {
                    if redact {
                        redact_error(error)
                    } else {
                        error.clone()
                    }
                }),
            },
        }
    }
}

/// Keep the error's classification, drop anything that can quote a value
fn redact_error(error: &ToolError) -> ToolError {
    ToolError {
        message: REDACTED.to_string(),
        details: error
            .details
            .as_ref()
            .map(|_| Value::String(REDACTED.to_string())),
        ..error.clone()
    }
}
