//! Scripted in-memory adapter.
//!
//! Plays back pre-built turns in order and records every request it
//! receives, so tests can assert both on what the caller saw and on what the
//! orchestration layer sent to the "vendor".

use crate::adapter::{Capabilities, ChunkStream, ModelAdapter, StreamOptions};
use crate::types::{Chunk, Message, Part, ToolCallPart, Usage};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

/// One scripted model reply
#[derive(Debug, Clone, Default)]
pub struct MockTurn {
    chunks: Vec<Chunk>,
    stream_error: Option<String>,
    refusal: Option<String>,
}

impl MockTurn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Text streamed word by word
    pub fn text(mut self, text: &str) -> Self {
        self.chunks
            .extend(text.split_inclusive(' ').map(Chunk::text));
        self
    }

    pub fn thinking(mut self, text: &str) -> Self {
        self.chunks.push(Chunk::default().with_thinking(text));
        self
    }

    /// A complete tool call delivered in one fragment
    pub fn tool_call(mut self, id: &str, name: &str, arguments: Value) -> Self {
        let call = ToolCallPart::new(id, name, arguments);
        self.chunks.push(Chunk::messages(vec![Message::model_with_parts(vec![
            Part::ToolCall(call),
        ])]));
        self
    }

    /// A tool call whose argument JSON arrives in two partial stubs
    pub fn streamed_tool_call(mut self, id: &str, name: &str, raw_arguments: &str) -> Self {
        let split = raw_arguments
            .char_indices()
            .map(|(i, _)| i)
            .nth(raw_arguments.chars().count() / 2)
            .unwrap_or(raw_arguments.len());
        for raw in [&raw_arguments[..split], raw_arguments] {
            let stub = ToolCallPart::partial(id, name, raw);
            self.chunks.push(Chunk::messages(vec![Message::model_with_parts(vec![
                Part::ToolCall(stub),
            ])]));
        }
        self
    }

    pub fn metadata(mut self, key: &str, event: Value) -> Self {
        self.chunks.push(Chunk::default().with_metadata(key, event));
        self
    }

    pub fn usage(mut self, input_tokens: u64, output_tokens: u64) -> Self {
        self.chunks.push(
            Chunk::default().with_usage(Usage::new(Some(input_tokens), Some(output_tokens))),
        );
        self
    }

    pub fn chunk(mut self, chunk: Chunk) -> Self {
        self.chunks.push(chunk);
        self
    }

    /// Fails mid-stream after the chunks scripted so far
    pub fn stream_error(mut self, message: &str) -> Self {
        self.stream_error = Some(message.to_string());
        self
    }

    /// Rejects the request before any chunk is produced
    pub fn refused(message: &str) -> Self {
        Self {
            refusal: Some(message.to_string()),
            ..Self::default()
        }
    }
}

/// A request as the adapter received it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub history: Vec<Message>,
    pub options: StreamOptions,
}

/// Adapter that replays [`MockTurn`]s
#[derive(Debug)]
pub struct MockAdapter {
    name: String,
    capabilities: Capabilities,
    turns: Mutex<VecDeque<MockTurn>>,
    repeating: Option<MockTurn>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    /// A tool-capable adapter with no native schema support
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            capabilities: Capabilities::chat_only().with_tools(true),
            turns: Mutex::new(VecDeque::new()),
            repeating: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_turn(self, turn: MockTurn) -> Self {
        lock(&self.turns).push_back(turn);
        self
    }

    pub fn with_text_turn(self, text: &str) -> Self {
        self.with_turn(MockTurn::new().text(text))
    }

    pub fn with_tool_turn(self, id: &str, name: &str, arguments: Value) -> Self {
        self.with_turn(MockTurn::new().tool_call(id, name, arguments))
    }

    /// Played for every request once the scripted turns run out
    pub fn with_repeating_turn(mut self, turn: MockTurn) -> Self {
        self.repeating = Some(turn);
        self
    }

    /// Every request received so far, oldest first
    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn request_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Scripted turns not yet played
    pub fn remaining_turns(&self) -> usize {
        lock(&self.turns).len()
    }
}

// A panicking test thread must not take the script down with it
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ModelAdapter for MockAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn send_stream(
        &self,
        history: &[Message],
        options: &StreamOptions,
    ) -> Result<ChunkStream> {
        lock(&self.requests).push(RecordedRequest {
            history: history.to_vec(),
            options: options.clone(),
        });

        let next = lock(&self.turns).pop_front();
        let Some(turn) = next.or_else(|| self.repeating.clone()) else {
            return Err(Error::adapter(&self.name, "no scripted turns left"));
        };

        if let Some(message) = turn.refusal {
            return Err(Error::adapter(&self.name, message));
        }

        let mut items: Vec<Result<Chunk>> = turn.chunks.into_iter().map(Ok).collect();
        match turn.stream_error {
            Some(message) => items.push(Err(Error::stream(message))),
            None => items.push(Ok(Chunk::final_marker())),
        }
        Ok(Box::pin(tokio_stream::iter(items)))
    }
}
