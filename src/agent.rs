//! Agent facade.
//!
//! An [`Agent`] pairs one [`ModelAdapter`] with fixed [`AgentOptions`]. It
//! keeps no conversation state: every call takes the history to continue
//! from and hands back the messages it appended, which the caller threads
//! into the next call.
//!
//! ## Request flow
//!
//! ```text
//! send_stream(prompt, history)
//!     │
//!     ├─> system prompt + history + user prompt, alternation validated
//!     │
//!     ├─> orchestrator selected from adapter capabilities and request shape
//!     │
//!     ├─> first chunk: the new user message
//!     │
//!     ├─> process_iteration until Done
//!     │     text deltas, appended messages, metadata, usage
//!     │
//!     └─> final chunk: is_final, aggregated metadata, total usage
//! ```
//!
//! Validation and orchestrator selection happen before the stream is handed
//! back, so configuration mistakes surface without any request being issued.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_orchestra::{Agent, AgentOptions, MockAdapter};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = Arc::new(MockAdapter::new().with_text_turn("5"));
//! let agent = Agent::new(adapter, AgentOptions::default());
//!
//! let response = agent.send("What is 2+3?", &[]).await?;
//! assert_eq!(response.output, "5");
//! # Ok(())
//! # }
//! ```

use crate::adapter::{ChunkStream, ModelAdapter};
use crate::config::AgentOptions;
use crate::history::{validate_alternation, with_prompt};
use crate::metadata::merge_events;
use crate::orchestrator::select_orchestrator;
use crate::state::StreamingState;
use crate::tools::ToolRegistry;
use crate::types::{Chunk, Message, Role, Usage};
use crate::{Error, Result};
use async_stream::try_stream;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Everything one call produced, collected from its stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentResponse {
    /// All forwarded output text, concatenated
    pub output: String,
    /// All reasoning text, concatenated
    pub thinking: Option<String>,
    /// Messages appended during the call, starting with the user prompt
    pub messages: Vec<Message>,
    /// Tool-progress events, keyed by tool or category
    pub metadata: Map<String, Value>,
    pub usage: Usage,
}

impl AgentResponse {
    /// The last model message of the call
    pub fn final_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Model)
    }

    /// Folds one chunk into the response
    pub fn absorb(&mut self, chunk: Chunk) {
        self.output.push_str(&chunk.output_text);
        if let Some(thinking) = chunk.thinking_text.filter(|t| !t.is_empty()) {
            self.thinking
                .get_or_insert_with(String::new)
                .push_str(&thinking);
        }
        self.messages.extend(chunk.new_messages);

        // the final chunk restates the whole call's totals
        if chunk.is_final {
            self.metadata = chunk.metadata;
            self.usage = chunk.usage;
        } else {
            merge_events(&mut self.metadata, &chunk.metadata);
        }
    }
}

/// A decoded typed answer plus the response it came from
#[derive(Debug, Clone)]
pub struct TypedResponse<T> {
    pub value: T,
    pub response: AgentResponse,
}

/// Drives conversations against one model adapter
#[derive(Clone)]
pub struct Agent {
    adapter: Arc<dyn ModelAdapter>,
    options: AgentOptions,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("adapter", &self.adapter.name())
            .field("options", &self.options)
            .finish()
    }
}

impl Agent {
    pub fn new(adapter: Arc<dyn ModelAdapter>, options: AgentOptions) -> Self {
        Self { adapter, options }
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn adapter(&self) -> &Arc<dyn ModelAdapter> {
        &self.adapter
    }

    /// Streams one call for a text prompt.
    pub async fn send_stream(&self, prompt: &str, history: &[Message]) -> Result<ChunkStream> {
        self.send_message_stream(Message::user(prompt), history)
            .await
    }

    /// Streams one call for a prepared user message, e.g. one with attachments.
    ///
    /// # Errors
    ///
    /// Fails before any request if `prompt` is not a user message, the
    /// resulting history breaks alternation, tool names collide, or the
    /// adapter cannot serve the request shape.
    pub async fn send_message_stream(
        &self,
        prompt: Message,
        history: &[Message],
    ) -> Result<ChunkStream> {
        if prompt.role != Role::User {
            return Err(Error::invalid_input("prompt must be a user message"));
        }

        let messages = with_prompt(self.options.system_prompt(), history, prompt.clone());
        validate_alternation(&messages)?;

        let registry = ToolRegistry::from_tools(self.options.tools().iter().cloned())?;
        let mut orchestrator = select_orchestrator(
            &self.adapter.capabilities(),
            !registry.is_empty(),
            self.options.output_schema(),
        )?;
        log::debug!(
            "{}: starting call with {:?} orchestrator",
            self.adapter.name(),
            orchestrator.kind()
        );

        let adapter = Arc::clone(&self.adapter);
        let mut state = StreamingState::new(messages, registry, self.options.max_iterations());

        Ok(Box::pin(try_stream! {
            yield Chunk::messages(vec![prompt]);

            while !state.is_done() {
                let mut iteration = orchestrator.process_iteration(adapter.as_ref(), &mut state);
                while let Some(chunk) = iteration.next().await {
                    let chunk = chunk?;
                    yield chunk;
                }
            }

            yield Chunk {
                metadata: state.metadata().clone(),
                usage: state.usage(),
                is_final: true,
                ..Default::default()
            };
        }))
    }

    /// Runs one call to completion.
    pub async fn send(&self, prompt: &str, history: &[Message]) -> Result<AgentResponse> {
        let stream = self.send_stream(prompt, history).await?;
        collect(stream).await
    }

    /// Runs one call with a prepared user message.
    pub async fn send_message(
        &self,
        prompt: Message,
        history: &[Message],
    ) -> Result<AgentResponse> {
        let stream = self.send_message_stream(prompt, history).await?;
        collect(stream).await
    }

    /// Runs one call and decodes the final model message as `T`.
    ///
    /// Meant for agents configured with an output schema. The text is not
    /// checked against the schema beyond what decoding into `T` implies.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] when the final text does not decode as `T`.
    pub async fn send_for<T: DeserializeOwned>(
        &self,
        prompt: &str,
        history: &[Message],
    ) -> Result<TypedResponse<T>> {
        let response = self.send(prompt, history).await?;
        let text = response
            .final_message()
            .map(Message::text)
            .unwrap_or_default();
        let value = serde_json::from_str(text.trim())?;
        Ok(TypedResponse { value, response })
    }
}

async fn collect(mut stream: ChunkStream) -> Result<AgentResponse> {
    let mut response = AgentResponse::default();
    while let Some(chunk) = stream.next().await {
        response.absorb(chunk?);
    }
    Ok(response)
}
