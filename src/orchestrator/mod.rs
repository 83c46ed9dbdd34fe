//! Turn-loop strategies.
//!
//! An orchestrator drives one model request per [`process_iteration`] call:
//! it streams the adapter's reply into the [`StreamingState`], forwards what
//! the caller should see, and runs the tool batch the reply asked for. The
//! agent keeps calling it until the state reaches [`Phase::Done`].
//!
//! ```text
//! Requesting -> Accumulating -> CheckingToolCalls -> ExecutingTools -> Requesting ...
//!                                                 \-> Done
//! ```
//!
//! Which strategy runs is decided once per call by [`select_orchestrator`],
//! from nothing but the adapter's declared [`Capabilities`] and the shape of
//! the request.
//!
//! [`process_iteration`]: StreamingOrchestrator::process_iteration

mod default;
mod double_agent;
mod typed_output;

pub use default::DefaultOrchestrator;
pub use double_agent::DoubleAgentOrchestrator;
pub use typed_output::TypedOutputOrchestrator;

use crate::accumulator::MessageAccumulator;
use crate::adapter::{Capabilities, ModelAdapter, StreamOptions};
use crate::executor::{ToolExecutionResult, ToolExecutor};
use crate::metadata::normalize_events;
use crate::state::{Phase, StreamingState};
use crate::types::{Chunk, Message, ToolCallPart};
use crate::{Error, Result};
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;

/// Message metadata key under which withheld model prose is attached
pub const SUPPRESSED_TEXT_KEY: &str = "suppressed_text";

/// Which strategy a call runs under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorKind {
    Default,
    TypedNative,
    TypedSynthetic,
    DoubleAgent,
}

/// One turn-loop strategy.
///
/// Implementations are created fresh for every call and may keep per-call
/// bookkeeping in `self`.
pub trait StreamingOrchestrator: Send {
    fn kind(&self) -> OrchestratorKind;

    /// Issues one model request and, if the reply asks for tools, runs them.
    ///
    /// Yields caller-facing chunks: text deltas as they arrive, then every
    /// complete message appended to the history. Marks the state
    /// [`Phase::Done`] when the loop should stop.
    fn process_iteration<'a>(
        &'a mut self,
        adapter: &'a dyn ModelAdapter,
        state: &'a mut StreamingState,
    ) -> BoxStream<'a, Result<Chunk>>;
}

/// Picks the strategy for one call.
///
/// | schema | tools | adapter declares                    | strategy          |
/// |--------|-------|-------------------------------------|-------------------|
/// | no     | any   | tools (when tools are given)        | Default           |
/// | yes    | no    | native schema                       | Typed, native     |
/// | yes    | yes   | native schema + tools with schema   | Typed, native     |
/// | yes    | yes   | native schema, tools, not together  | Double agent      |
/// | yes    | any   | tools, no native schema             | Typed, synthetic  |
///
/// Anything else cannot be served and is rejected before a request is made.
pub fn select_orchestrator(
    capabilities: &Capabilities,
    has_tools: bool,
    output_schema: Option<&Value>,
) -> Result<Box<dyn StreamingOrchestrator>> {
    let Some(schema) = output_schema else {
        if has_tools && !capabilities.supports_tools {
            return Err(Error::unsupported("adapter does not support tool calling"));
        }
        return Ok(Box::new(DefaultOrchestrator::new()));
    };

    if capabilities.supports_native_schema {
        if !has_tools || capabilities.supports_tools_with_schema {
            return Ok(Box::new(TypedOutputOrchestrator::native(schema.clone())));
        }
        if capabilities.supports_tools {
            return Ok(Box::new(DoubleAgentOrchestrator::new(schema.clone())));
        }
        return Err(Error::unsupported(
            "adapter does not support tool calling alongside an output schema",
        ));
    }

    if capabilities.supports_tools {
        return Ok(Box::new(TypedOutputOrchestrator::synthetic(schema)));
    }

    Err(Error::unsupported(
        "adapter supports neither a native output schema nor tool calling",
    ))
}

/// Streams one model reply into `state.current()`.
///
/// Every adapter chunk is folded into the in-progress message and its text
/// recorded as turn text. Text is forwarded only when `forward_text` is set;
/// thinking, metadata and usage are always forwarded. The turn ends at the
/// adapter's final chunk or at the end of its stream, after which the message
/// is consolidated and the phase moves to [`Phase::CheckingToolCalls`].
pub(crate) fn stream_turn<'a>(
    adapter: &'a dyn ModelAdapter,
    state: &'a mut StreamingState,
    options: StreamOptions,
    forward_text: bool,
) -> BoxStream<'a, Result<Chunk>> {
    Box::pin(try_stream! {
        let accumulator = MessageAccumulator::new();
        log::debug!(
            "{}: request {} of {} ({} tools, schema: {})",
            adapter.name(),
            state.iterations(),
            state.max_iterations(),
            options.tools.len(),
            options.output_schema.is_some()
        );

        let mut stream = adapter.send_stream(state.history(), &options).await?;
        state.set_phase(Phase::Accumulating);

        while let Some(chunk) = stream.next().await {
            let Chunk {
                output_text,
                thinking_text,
                new_messages,
                metadata,
                usage,
                is_final,
            } = chunk?;

            for fragment in &new_messages {
                let merged = accumulator.accumulate(state.take_current(), fragment);
                *state.current_mut() = merged;
            }
            state.push_turn_text(&output_text);
            state.add_usage(&usage);

            let metadata = normalize_events(metadata);
            state.merge_metadata(&metadata);

            let forwarded = Chunk {
                output_text: if forward_text { output_text } else { String::new() },
                thinking_text,
                new_messages: Vec::new(),
                metadata,
                usage,
                is_final: false,
            };
            if !forwarded.is_empty() {
                yield forwarded;
            }

            if is_final {
                break;
            }
        }

        let consolidated = accumulator.consolidate(state.take_current());
        *state.current_mut() = consolidated;
        state.set_phase(Phase::CheckingToolCalls);
    })
}

/// Runs one batch and appends its single results message to the history.
pub(crate) async fn execute_tools(
    state: &mut StreamingState,
    calls: &[ToolCallPart],
) -> (Vec<ToolExecutionResult>, Message) {
    state.set_phase(Phase::ExecutingTools);
    log::debug!("executing {} tool call(s)", calls.len());

    let executor = ToolExecutor::new();
    let results = executor.execute_batch(calls, state.registry()).await;
    let message = executor.results_message(&results);
    state.append(message.clone());
    (results, message)
}

/// Attaches withheld prose to a terminal message, if there is any
pub(crate) fn with_suppressed_text(message: Message, suppressed: &str) -> Message {
    if suppressed.is_empty() {
        return message;
    }
    message.with_metadata(SUPPRESSED_TEXT_KEY, Value::String(suppressed.to_string()))
}

/// Owned copies of a message's tool calls, in order
pub(crate) fn owned_calls(message: &Message) -> Vec<ToolCallPart> {
    message.tool_calls().into_iter().cloned().collect()
}
