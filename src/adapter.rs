//! The model adapter contract.
//!
//! An adapter hides one vendor's transport, authentication and wire format
//! behind a uniform streaming call. The orchestration layer only ever talks to
//! this trait and to the capability flags the adapter declares up front.

use crate::Result;
use crate::types::{Chunk, Message};
use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

/// Lazy, pull-driven sequence of chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk>> + Send>>;

/// What an adapter declares it can do.
///
/// Orchestrator selection reads these flags once per call; nothing in the
/// core probes a vendor to find out at runtime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub supports_tools: bool,
    pub supports_native_schema: bool,
    pub supports_tools_with_schema: bool,
    pub supports_thinking: bool,
}

impl Capabilities {
    /// Tools, native schema, and both in one request
    pub fn full() -> Self {
        Self {
            supports_tools: true,
            supports_native_schema: true,
            supports_tools_with_schema: true,
            supports_thinking: false,
        }
    }

    /// Plain chat, no tools and no schema
    pub fn chat_only() -> Self {
        Self::default()
    }

    pub fn with_tools(mut self, yes: bool) -> Self {
        self.supports_tools = yes;
        self
    }

    pub fn with_native_schema(mut self, yes: bool) -> Self {
        self.supports_native_schema = yes;
        self
    }

    pub fn with_tools_and_schema(mut self, yes: bool) -> Self {
        self.supports_tools_with_schema = yes;
        self
    }

    pub fn with_thinking(mut self, yes: bool) -> Self {
        self.supports_thinking = yes;
        self
    }
}

/// A tool as presented to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// Per-request options handed to the adapter
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOptions {
    pub tools: Vec<ToolDefinition>,
    pub output_schema: Option<Value>,
}

impl StreamOptions {
    pub fn new(tools: Vec<ToolDefinition>, output_schema: Option<Value>) -> Self {
        Self {
            tools,
            output_schema,
        }
    }

    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }
}

/// One vendor behind a uniform streaming interface.
///
/// `send_stream` yields chunks whose `new_messages` are fragments of the
/// model message being generated. The adapter signals the end of the turn
/// with a chunk whose `is_final` is set; ending the stream also ends the turn.
/// Transport and authentication errors are returned unchanged and propagate
/// to the caller.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Adapter name, used in logs and errors
    fn name(&self) -> &str;

    fn capabilities(&self) -> Capabilities;

    async fn send_stream(&self, history: &[Message], options: &StreamOptions)
    -> Result<ChunkStream>;
}
