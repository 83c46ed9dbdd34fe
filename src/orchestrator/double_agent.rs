use super::{
    DefaultOrchestrator, OrchestratorKind, StreamingOrchestrator, stream_turn,
    with_suppressed_text,
};
use crate::Result;
use crate::adapter::{ModelAdapter, StreamOptions};
use crate::state::{Phase, StreamingState};
use crate::types::{Chunk, Part};
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;

/// Two-phase workaround for adapters that accept tools and a native output
/// schema, but not both in one request.
///
/// Phase one is the default tool loop with tools and no schema. Its prose is
/// suppressed, since the caller asked for schema output rather than chat, and
/// its closing message is withheld from the history.
///
/// Phase two is a single request with the schema and no tools over the
/// phase-one history. Its text is forwarded as the typed answer, and the
/// suppressed phase-one prose is attached to the final message under
/// [`SUPPRESSED_TEXT_KEY`](super::SUPPRESSED_TEXT_KEY).
///
/// Holds which phase it is in, so a fresh instance is needed for every call.
#[derive(Debug)]
pub struct DoubleAgentOrchestrator {
    phase_one: DefaultOrchestrator,
    output_schema: Value,
    in_phase_two: bool,
}

impl DoubleAgentOrchestrator {
    pub fn new(output_schema: Value) -> Self {
        Self {
            phase_one: DefaultOrchestrator::suppressing_text(),
            output_schema,
            in_phase_two: false,
        }
    }

    pub fn in_phase_two(&self) -> bool {
        self.in_phase_two
    }
}

impl StreamingOrchestrator for DoubleAgentOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::DoubleAgent
    }

    fn process_iteration<'a>(
        &'a mut self,
        adapter: &'a dyn ModelAdapter,
        state: &'a mut StreamingState,
    ) -> BoxStream<'a, Result<Chunk>> {
        Box::pin(try_stream! {
            if !self.in_phase_two {
                {
                    let mut inner = self.phase_one.process_iteration(adapter, &mut *state);
                    while let Some(chunk) = inner.next().await {
                        let chunk = chunk?;
                        yield chunk;
                    }
                }

                if state.is_done() {
                    log::debug!(
                        "phase one finished after {} request(s), requesting schema output",
                        state.iterations()
                    );
                    self.in_phase_two = true;
                    state.set_phase(Phase::Requesting);
                }
            } else {
                state.begin_closing_request();
                let options = StreamOptions::new(Vec::new(), Some(self.output_schema.clone()));

                {
                    let mut turn = stream_turn(adapter, &mut *state, options, true);
                    while let Some(chunk) = turn.next().await {
                        let chunk = chunk?;
                        yield chunk;
                    }
                }

                state.take_turn_text();
                let mut message = state.take_current();
                if message.has_tool_calls() {
                    log::warn!("dropping tool calls from a request made without tools");
                    message.parts.retain(|p| !matches!(p, Part::ToolCall(_)));
                }
                let message = with_suppressed_text(message, state.suppressed_text());

                state.append(message.clone());
                yield Chunk::messages(vec![message]);
                state.finish();
            }
        })
    }
}
