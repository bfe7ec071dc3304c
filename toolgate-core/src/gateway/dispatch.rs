//! Provider dispatch under a timeout

use crate::providers::{Provider, ProviderContext};
use crate::tools::{ToolCall, ToolContract, ToolError, ToolResult};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::time::Instant;

/// Timeout for a call: the caller's, else the contract's `max_runtime_ms`
pub fn effective_timeout(call: &ToolCall, contract: &ToolContract) -> Option<Duration> {
    call.timeout().or_else(|| contract.constraints().max_runtime())
}

/// Execute `call` on `provider`
///
/// Never fails: provider errors, panics and timeouts all come back as failed
/// results with the elapsed duration set.
pub async fn dispatch(
    provider: &dyn Provider,
    call: &ToolCall,
    timeout: Option<Duration>,
) -> ToolResult {
    let ctx = ProviderContext::for_call(call).with_timeout(timeout);
    let started = Instant::now();

    let execution =
        AssertUnwindSafe(provider.execute(&ctx, &call.tool_name, call.arguments.clone()))
            .catch_unwind();
    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, execution).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => Err(limit),
        },
        None => Ok(execution.await),
    };

    let result = match outcome {
        Ok(Ok(Ok(output))) => output.into_result(),
        Ok(Ok(Err(e))) => {
            tracing::debug!(tool = %call.tool_name, provider = %provider.id(), error = %e, "Provider returned error");
            ToolResult::failure(e.into_tool_error())
        }
        Ok(Err(panic)) => {
            let message = panic_message(panic.as_ref());
            tracing::error!(tool = %call.tool_name, provider = %provider.id(), panic = %message, "Provider panicked");
            ToolResult::failure(ToolError::provider(format!("tool panicked: {message}")))
        }
        Err(limit) => {
            ctx.cancellation.cancel();
            tracing::warn!(
                tool = %call.tool_name,
                provider = %provider.id(),
                timeout_ms = limit.as_millis() as u64,
                "Tool execution timed out"
            );
            ToolResult::failure(ToolError::timeout(limit))
        }
    };
    result.with_duration(started.elapsed())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
