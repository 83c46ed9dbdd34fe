use super::{
    DefaultOrchestrator, OrchestratorKind, StreamingOrchestrator, execute_tools, owned_calls,
    stream_turn, with_suppressed_text,
};
use crate::adapter::{ModelAdapter, StreamOptions};
use crate::state::{Phase, StreamingState};
use crate::tools::{RETURN_RESULT_TOOL, SyntheticResultTool};
use crate::types::{Chunk, Message};
use crate::{Error, Result};
use async_stream::try_stream;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

/// Loop that ends with output matching a caller-supplied schema.
///
/// With native schema support the vendor already emits conforming JSON as
/// ordinary text, so this is the default loop with the schema attached.
///
/// Without it the schema becomes the [`RETURN_RESULT_TOOL`] tool. Each turn's
/// text is held back until the turn ends, then both termination paths are
/// checked:
///
/// - the reply calls `return_result`: the whole batch runs so every call is
///   answered, a terminal model message carrying the compact JSON of the
///   call's arguments is appended and forwarded, and the loop ends even if
///   other tools were called alongside it
/// - the reply calls no tools: its text is the result and is forwarded
/// - the reply calls other tools only: its text is suppressed and the loop
///   continues
///
/// A `return_result` call whose arguments failed to parse does not end the
/// loop; the model sees the failure in the tool result and may try again.
#[derive(Debug)]
pub struct TypedOutputOrchestrator {
    mode: Mode,
}

#[derive(Debug)]
enum Mode {
    Native(DefaultOrchestrator),
    Synthetic(SyntheticResultTool),
}

impl TypedOutputOrchestrator {
    pub fn native(schema: Value) -> Self {
        Self {
            mode: Mode::Native(DefaultOrchestrator::with_output_schema(schema)),
        }
    }

    pub fn synthetic(schema: &Value) -> Self {
        Self {
            mode: Mode::Synthetic(SyntheticResultTool::new(schema)),
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self.mode, Mode::Native(_))
    }
}

impl StreamingOrchestrator for TypedOutputOrchestrator {
    fn kind(&self) -> OrchestratorKind {
        match self.mode {
            Mode::Native(_) => OrchestratorKind::TypedNative,
            Mode::Synthetic(_) => OrchestratorKind::TypedSynthetic,
        }
    }

    fn process_iteration<'a>(
        &'a mut self,
        adapter: &'a dyn ModelAdapter,
        state: &'a mut StreamingState,
    ) -> BoxStream<'a, Result<Chunk>> {
        match &mut self.mode {
            Mode::Native(inner) => inner.process_iteration(adapter, state),
            Mode::Synthetic(synthetic) => synthetic_iteration(synthetic, adapter, state),
        }
    }
}

fn synthetic_iteration<'a>(
    synthetic: &'a SyntheticResultTool,
    adapter: &'a dyn ModelAdapter,
    state: &'a mut StreamingState,
) -> BoxStream<'a, Result<Chunk>> {
    Box::pin(try_stream! {
        match state.registry().get(RETURN_RESULT_TOOL) {
            None => state.registry_mut().register(synthetic.tool())?,
            Some(existing) if Arc::ptr_eq(existing, &synthetic.tool()) => {}
            Some(_) => Err::<(), Error>(Error::tool(format!(
                "tool name '{}' is reserved for typed output",
                RETURN_RESULT_TOOL
            )))?,
        }
        state.begin_request()?;
        let options = StreamOptions::new(state.registry().definitions(), None);

        {
            let mut turn = stream_turn(adapter, &mut *state, options, false);
            while let Some(chunk) = turn.next().await {
                let chunk = chunk?;
                yield chunk;
            }
        }

        let turn_text = state.take_turn_text();
        let message = state.take_current();
        let calls = owned_calls(&message);

        if calls.is_empty() {
            let message = with_suppressed_text(message, state.suppressed_text());
            state.append(message.clone());
            if !turn_text.is_empty() {
                yield Chunk {
                    output_text: turn_text,
                    ..Default::default()
                };
            }
            yield Chunk::messages(vec![message]);
            state.finish();
        } else {
            state.suppress(&turn_text);
            state.append(message.clone());
            yield Chunk::messages(vec![message]);

            let (results, results_message) = execute_tools(&mut *state, &calls).await;
            yield Chunk::messages(vec![results_message]);

            let answer = results
                .iter()
                .filter(|r| r.call.name == RETURN_RESULT_TOOL)
                .find_map(|r| r.outcome.as_ref().ok());

            match answer {
                Some(arguments) => {
                    let json = serde_json::to_string(&synthetic.extract(arguments))?;
                    let terminal =
                        with_suppressed_text(Message::model(json.clone()), state.suppressed_text());
                    state.append(terminal.clone());
                    yield Chunk {
                        output_text: json,
                        new_messages: vec![terminal],
                        ..Default::default()
                    };
                    state.finish();
                }
                None => {
                    if calls.iter().any(|c| c.name == RETURN_RESULT_TOOL) {
                        log::debug!("return_result call failed, continuing the loop");
                    }
                    state.set_phase(Phase::Requesting);
                }
            }
        }
    })
}
