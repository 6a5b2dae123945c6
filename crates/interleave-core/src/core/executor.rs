//! Tool execution stage: runs one pending call and shapes its outcome.

use std::time::Duration;

use tracing::{info, warn};

use crate::core::accumulator::ToolCall;
use crate::core::events::{StreamEvent, ToolOutput};
use crate::tools::{ToolRegistry, ToolResult, validate_input};

/// What one call produced: the event to relay and the result to feed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutcome {
    pub event: StreamEvent,
    pub result: ToolResult,
}

/// Executes a single call. Never fails: every problem becomes a `tool_error`
/// event plus an `is_error` result.
pub async fn execute_call(
    registry: &ToolRegistry,
    call: &ToolCall,
    timeout: Option<Duration>,
) -> ToolOutcome {
    let output = run_tool(registry, call, timeout).await;

    let event = match &output {
        ToolOutput::Success { text } => {
            info!(tool = %call.name, id = %call.id, "tool succeeded");
            StreamEvent::ToolResult {
                tool: call.name.clone(),
                input: call.input.clone(),
                result: text.clone(),
            }
        }
        ToolOutput::Failure { code, message } => {
            warn!(tool = %call.name, id = %call.id, code = %code, error = %message, "tool failed");
            StreamEvent::ToolError {
                tool: call.name.clone(),
                error: message.clone(),
            }
        }
    };

    ToolOutcome {
        event,
        result: ToolResult::from_output(call.id.clone(), &output),
    }
}

async fn run_tool(registry: &ToolRegistry, call: &ToolCall, timeout: Option<Duration>) -> ToolOutput {
    let (Some(definition), Some(handler)) =
        (registry.definition(&call.name), registry.handler(&call.name))
    else {
        return ToolOutput::failure("unknown_tool", format!("Tool not found: {}", call.name));
    };

    if let Err(msg) = validate_input(&definition.input_schema, &call.input) {
        return ToolOutput::failure(
            "invalid_input",
            format!("Invalid input for {}: {msg}", call.name),
        );
    }

    // Spawned so a panicking handler surfaces as a JoinError.
    let mut handle = tokio::spawn(handler(call.input.clone()));

    match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => join_failure(&e),
            Err(_) => {
                handle.abort();
                ToolOutput::failure(
                    "timeout",
                    format!(
                        "Tool execution timed out after {} seconds",
                        limit.as_secs()
                    ),
                )
            }
        },
        None => match handle.await {
            Ok(output) => output,
            Err(e) => join_failure(&e),
        },
    }
}

fn join_failure(e: &tokio::task::JoinError) -> ToolOutput {
    if e.is_panic() {
        ToolOutput::failure("panic", "Tool execution panicked")
    } else {
        ToolOutput::failure("cancelled", "Tool execution was cancelled")
    }
}
