//! # Agent Orchestra
//!
//! A streaming-first orchestration layer for LLM agents over interchangeable
//! model backends.
//!
//! ## Overview
//!
//! An [`Agent`] turns one user prompt into a stream of [`Chunk`]s. Behind it,
//! a [`ModelAdapter`] talks to the vendor and an orchestrator drives the
//! request/tool loop:
//!
//! - **Tool loop**: tool calls are executed concurrently and their results
//!   fed back until the model answers without calling tools
//! - **Typed output**: a JSON Schema for the final answer, served natively
//!   when the adapter supports it and through a synthetic `return_result`
//!   tool when it does not
//! - **Double agent**: a tool phase followed by a schema phase, for adapters
//!   that cannot take tools and a schema in one request
//! - **Stateless calls**: the caller owns the history and threads the
//!   returned messages into the next call
//!
//! Any OpenAI-compatible server works through [`OpenAiAdapter`] (OpenAI,
//! LM Studio, Ollama, llama.cpp, vLLM). [`MockAdapter`] replays scripted turns
//! for tests.
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_orchestra::{Agent, AgentOptions, OpenAiAdapter, OpenAiConfig, tool};
//! use futures::StreamExt;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OpenAiConfig::builder()
//!         .base_url("http://localhost:11434/v1")
//!         .model("qwen3:8b")
//!         .build()?;
//!
//!     let add = tool("add", "Add two numbers")
//!         .param("a", "number")
//!         .param("b", "number")
//!         .build(|args| async move {
//!             let a = args["a"].as_f64().unwrap_or(0.0);
//!             let b = args["b"].as_f64().unwrap_or(0.0);
//!             Ok(json!(a + b))
//!         });
//!
//!     let options = AgentOptions::builder()
//!         .system_prompt("You are a careful calculator")
//!         .tool(add)
//!         .build()?;
//!
//!     let agent = Agent::new(Arc::new(OpenAiAdapter::new(config)?), options);
//!     let mut stream = agent.send_stream("What is 2+3?", &[]).await?;
//!     while let Some(chunk) = stream.next().await {
//!         print!("{}", chunk?.output_text);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **agent**: the facade; validates input and drives an orchestrator
//! - **orchestrator**: default, typed-output and double-agent strategies
//! - **state**: per-call mutable state shared across iterations
//! - **executor**: concurrent, order-preserving tool execution
//! - **accumulator**: folds streamed fragments into complete messages
//! - **adapter**: the vendor boundary and capability flags
//! - **providers**: the OpenAI-compatible adapter and the scripted mock
//! - **retry**: exponential backoff for connection setup

mod accumulator;
mod adapter;
mod agent;
mod config;
mod error;
mod executor;
mod history;
mod metadata;
mod state;
mod tools;
mod types;

/// Orchestration strategies and their selection.
pub mod orchestrator;

/// Model adapters.
pub mod providers;

/// Retry utilities with exponential backoff and jitter.
pub mod retry;

// --- Agent API ---

pub use agent::{Agent, AgentResponse, TypedResponse};

// --- Configuration ---

pub use config::{
    API_KEY_ENV, AgentOptions, AgentOptionsBuilder, BASE_URL_ENV, DEFAULT_MAX_ITERATIONS,
    MODEL_ENV, Provider, get_api_key, get_base_url, get_model,
};

// --- Error Handling ---

pub use error::{Error, Result};

// --- Adapter Boundary ---

pub use adapter::{Capabilities, ChunkStream, ModelAdapter, StreamOptions, ToolDefinition};
pub use providers::{MockAdapter, MockTurn, OpenAiAdapter, OpenAiConfig};

// --- Orchestration Building Blocks ---

pub use accumulator::MessageAccumulator;
pub use executor::{ToolExecutionResult, ToolExecutor, ToolFailure, ToolFailureKind};
pub use history::{validate_alternation, with_prompt};
pub use metadata::{merge_events, normalize_events};
pub use orchestrator::{OrchestratorKind, SUPPRESSED_TEXT_KEY, StreamingOrchestrator};
pub use state::{Phase, StreamingState};

// --- Tool System ---

pub use tools::{RETURN_RESULT_TOOL, SyntheticResultTool, Tool, ToolBuilder, ToolRegistry, tool};

// --- Core Types ---

pub use types::{
    Chunk, DataPart, LinkPart, Message, Part, Role, TextPart, ToolCallPart, ToolResultPart, Usage,
};

/// The types most callers need.
///
/// ```rust
/// use agent_orchestra::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Agent, AgentOptions, AgentOptionsBuilder, AgentResponse, Capabilities, Chunk, Error,
        Message, ModelAdapter, Part, Result, Role, Tool, tool,
    };
}
