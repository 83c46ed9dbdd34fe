//! Model adapters.
//!
//! [`openai`] speaks the OpenAI-compatible chat completions protocol, which
//! covers hosted OpenAI and the common local servers. [`mock`] replays
//! scripted turns for tests and demos.

pub mod mock;
pub mod openai;

pub use mock::{MockAdapter, MockTurn, RecordedRequest};
pub use openai::{OpenAiAdapter, OpenAiConfig, OpenAiConfigBuilder};
