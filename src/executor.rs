//! Tool execution for one model turn.
//!
//! Every tool call in a consolidated model message is dispatched onto its own
//! tokio task, so sibling calls run concurrently and a slow or panicking
//! handler cannot hold up or abort the others. Results are collected in the
//! original call order, never completion order, and folded into exactly one
//! `user` message. Several vendor protocols require strict role alternation,
//! so results for one turn are never split across messages.
//!
//! If the caller drops the stream while a batch is running, the spawned
//! invocations keep going to completion and their results are discarded:
//! handlers are arbitrary code with no cancellation hook.

use crate::tools::ToolRegistry;
use crate::types::{Message, Part, ToolCallPart, ToolResultPart};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::any::Any;

/// Why a tool call produced no value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    /// No tool with that name is registered for this call
    UnknownTool,
    /// The streamed argument JSON could not be parsed
    InvalidArguments,
    /// The handler returned an error or panicked
    ExecutionFailed,
}

/// Failure marker carried by a [`ToolResultPart`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolFailureKind,
    pub message: String,
}

impl ToolFailure {
    pub fn unknown_tool(name: &str) -> Self {
        Self {
            kind: ToolFailureKind::UnknownTool,
            message: format!("Tool '{}' not found", name),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self {
            kind: ToolFailureKind::InvalidArguments,
            message: message.into(),
        }
    }

    pub fn execution_failed(message: impl Into<String>) -> Self {
        Self {
            kind: ToolFailureKind::ExecutionFailed,
            message: message.into(),
        }
    }
}

/// One call paired with its outcome
#[derive(Debug, Clone)]
pub struct ToolExecutionResult {
    pub call: ToolCallPart,
    pub outcome: std::result::Result<Value, ToolFailure>,
}

impl ToolExecutionResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The part sent back to the model.
    ///
    /// Failures carry an `error` payload the model can read, plus the
    /// structured [`ToolFailure`] for diagnostics.
    pub fn to_part(&self) -> Part {
        let (content, failure) = match &self.outcome {
            Ok(value) => (value.clone(), None),
            Err(failure) => (
                json!({
                    "error": failure.message,
                    "kind": failure.kind,
                    "tool": self.call.name,
                    "id": self.call.id,
                }),
                Some(failure.clone()),
            ),
        };

        Part::ToolResult(ToolResultPart {
            call_id: self.call.id.clone(),
            name: self.call.name.clone(),
            content,
            failure,
        })
    }
}

/// Runs batches of tool calls against a registry
#[derive(Debug, Default, Clone, Copy)]
pub struct ToolExecutor;

impl ToolExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Executes every call concurrently and returns results in call order.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCallPart],
        registry: &ToolRegistry,
    ) -> Vec<ToolExecutionResult> {
        // Spawning happens eagerly here, so every invocation is already
        // running before the first result is awaited.
        let pending: Vec<_> = calls
            .iter()
            .map(|call| {
                let dispatched = match (&call.argument_error, registry.get(&call.name)) {
                    (Some(error), _) => Err(ToolFailure::invalid_arguments(error.clone())),
                    (None, None) => Err(ToolFailure::unknown_tool(&call.name)),
                    (None, Some(tool)) => {
                        let handler = tool.handler();
                        Ok(tokio::spawn(handler(call.arguments.clone())))
                    }
                };
                let call = call.clone();

                async move {
                    let outcome = match dispatched {
                        Err(failure) => Err(failure),
                        Ok(task) => match task.await {
                            Ok(Ok(value)) => Ok(value),
                            Ok(Err(e)) => Err(ToolFailure::execution_failed(e.to_string())),
                            Err(join_error) if join_error.is_panic() => {
                                Err(ToolFailure::execution_failed(format!(
                                    "Tool panicked: {}",
                                    panic_message(join_error.into_panic())
                                )))
                            }
                            Err(join_error) => {
                                Err(ToolFailure::execution_failed(join_error.to_string()))
                            }
                        },
                    };

                    match &outcome {
                        Ok(_) => log::debug!("tool {} ({}) succeeded", call.name, call.id),
                        Err(f) => log::debug!(
                            "tool {} ({}) failed [{:?}]: {}",
                            call.name,
                            call.id,
                            f.kind,
                            f.message
                        ),
                    }

                    ToolExecutionResult { call, outcome }
                }
            })
            .collect();

        join_all(pending).await
    }

    /// Folds a batch's results into one `user` message, one part per call.
    pub fn results_message(&self, results: &[ToolExecutionResult]) -> Message {
        Message::user_with_parts(results.iter().map(ToolExecutionResult::to_part).collect())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
