use super::{OrchestratorKind, StreamingOrchestrator, execute_tools, owned_calls, stream_turn};
use crate::Result;
use crate::adapter::{ModelAdapter, StreamOptions};
use crate::state::{Phase, StreamingState};
use crate::types::{Chunk, Part};
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;

/// Plain chat/tool loop.
///
/// Requests, accumulates, and either runs the requested tools and loops, or
/// appends the closing message and stops.
///
/// In text-suppression mode (phase one of the double-agent protocol) the
/// model's prose is collected as suppressed text instead of being forwarded,
/// and the closing message is withheld from the history so that the request
/// that follows still sees a history ending in a `user` message.
#[derive(Debug, Clone, Default)]
pub struct DefaultOrchestrator {
    output_schema: Option<Value>,
    suppress_text: bool,
}

impl DefaultOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sends `schema` as the vendor's native output schema on every request
    pub fn with_output_schema(schema: Value) -> Self {
        Self {
            output_schema: Some(schema),
            suppress_text: false,
        }
    }

    /// Runs the loop without forwarding any model text
    pub fn suppressing_text() -> Self {
        Self {
            output_schema: None,
            suppress_text: true,
        }
    }

    pub fn suppresses_text(&self) -> bool {
        self.suppress_text
    }
}

impl StreamingOrchestrator for DefaultOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        if self.output_schema.is_some() {
            OrchestratorKind::TypedNative
        } else {
            OrchestratorKind::Default
        }
    }

    fn process_iteration<'a>(
        &'a mut self,
        adapter: &'a dyn ModelAdapter,
        state: &'a mut StreamingState,
    ) -> BoxStream<'a, Result<Chunk>> {
        Box::pin(try_stream! {
            state.begin_request()?;
            let options = StreamOptions::new(
                state.registry().definitions(),
                self.output_schema.clone(),
            );

            {
                let mut turn = stream_turn(adapter, &mut *state, options, !self.suppress_text);
                while let Some(chunk) = turn.next().await {
                    let chunk = chunk?;
                    yield chunk;
                }
            }

            let turn_text = state.take_turn_text();
            let mut message = state.take_current();
            if self.suppress_text {
                state.suppress(&turn_text);
            }

            if message.has_tool_calls() {
                // suppressed prose stays out of the history and the caller's chunks
                if self.suppress_text {
                    message.parts.retain(|p| !matches!(p, Part::Text(_)));
                }
                let calls = owned_calls(&message);
                state.append(message.clone());
                yield Chunk::messages(vec![message]);

                let (_, results) = execute_tools(&mut *state, &calls).await;
                yield Chunk::messages(vec![results]);
                state.set_phase(Phase::Requesting);
            } else {
                if self.suppress_text {
                    log::debug!("withholding closing message of a text-suppressed loop");
                } else {
                    state.append(message.clone());
                    yield Chunk::messages(vec![message]);
                }
                state.finish();
            }
        })
    }
}
