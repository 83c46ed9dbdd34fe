//! Core types: messages, parts and streamed chunks

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::executor::ToolFailure;

/// Message role in the conversation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Model,
}

/// Content parts that can appear in messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text(TextPart),
    ToolCall(ToolCallPart),
    ToolResult(ToolResultPart),
    Data(DataPart),
    Link(LinkPart),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text(TextPart::new(text))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        match self {
            Part::ToolCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultPart> {
        match self {
            Part::ToolResult(result) => Some(result),
            _ => None,
        }
    }
}

/// Text content part
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextPart {
    pub text: String,
}

impl TextPart {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// A request from the model to run a tool.
///
/// While streaming, vendors may deliver the call before its argument JSON is
/// complete. Such a call is a *partial stub*: `partial_arguments` holds the raw
/// argument text received so far and `arguments` is not meaningful yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallPart {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_arguments: Option<String>,
    /// Parse failure captured when a partial stub could not be completed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub argument_error: Option<String>,
}

impl ToolCallPart {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
            partial_arguments: None,
            argument_error: None,
        }
    }

    /// A stub whose argument JSON is still arriving
    pub fn partial(
        id: impl Into<String>,
        name: impl Into<String>,
        raw_arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: Value::Object(Map::new()),
            partial_arguments: Some(raw_arguments.into()),
            argument_error: None,
        }
    }

    pub fn is_partial(&self) -> bool {
        self.partial_arguments.is_some()
    }
}

/// The outcome of one tool call, sent back to the model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultPart {
    pub call_id: String,
    pub name: String,
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ToolFailure>,
}

impl ToolResultPart {
    pub fn success(call_id: impl Into<String>, name: impl Into<String>, content: Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            content,
            failure: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.failure.is_some()
    }
}

/// Inline binary attachment
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DataPart {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DataPart {
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Attachment referenced by URL
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LinkPart {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl LinkPart {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }
}

/// A message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Message {
    pub fn new(role: Role, parts: Vec<Part>) -> Self {
        Self {
            role,
            parts,
            metadata: Map::new(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::System, vec![Part::text(text)])
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, vec![Part::text(text)])
    }

    /// Create a user message with custom parts (attachments, tool results)
    pub fn user_with_parts(parts: Vec<Part>) -> Self {
        Self::new(Role::User, parts)
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self::new(Role::Model, vec![Part::text(text)])
    }

    pub fn model_with_parts(parts: Vec<Part>) -> Self {
        Self::new(Role::Model, parts)
    }

    /// An empty model message, the seed for accumulation
    pub fn empty_model() -> Self {
        Self::new(Role::Model, Vec::new())
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Concatenation of all text parts
    pub fn text(&self) -> String {
        self.parts.iter().filter_map(Part::as_text).collect()
    }

    pub fn tool_calls(&self) -> Vec<&ToolCallPart> {
        self.parts.iter().filter_map(Part::as_tool_call).collect()
    }

    pub fn tool_results(&self) -> Vec<&ToolResultPart> {
        self.parts.iter().filter_map(Part::as_tool_result).collect()
    }

    pub fn has_tool_calls(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, Part::ToolCall(_)))
    }
}

/// Token counters reported by an adapter
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
}

impl Usage {
    pub fn new(input_tokens: Option<u64>, output_tokens: Option<u64>) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.input_tokens.is_none() && self.output_tokens.is_none()
    }

    /// Adds `other` into `self`; a missing counter on one side takes the other's value
    pub fn add(&mut self, other: &Usage) {
        fn sum(a: Option<u64>, b: Option<u64>) -> Option<u64> {
            match (a, b) {
                (Some(a), Some(b)) => Some(a + b),
                (a, b) => a.or(b),
            }
        }
        self.input_tokens = sum(self.input_tokens, other.input_tokens);
        self.output_tokens = sum(self.output_tokens, other.output_tokens);
    }
}

/// One unit of streamed output.
///
/// Adapters emit chunks whose `new_messages` are fragments of the model
/// message being generated. The agent emits chunks whose `new_messages` are
/// complete messages appended to the conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub output_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub new_messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub usage: Usage,
    #[serde(default)]
    pub is_final: bool,
}

impl Chunk {
    /// A text delta paired with the matching model-message fragment
    pub fn text(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            new_messages: vec![Message::model(text.clone())],
            output_text: text,
            ..Default::default()
        }
    }

    /// A chunk carrying whole messages and no text
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            new_messages: messages,
            ..Default::default()
        }
    }

    /// End-of-turn marker
    pub fn final_marker() -> Self {
        Self {
            is_final: true,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking_text = Some(thinking.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn finished(mut self) -> Self {
        self.is_final = true;
        self
    }

    /// True when forwarding this chunk would tell the caller nothing
    pub fn is_empty(&self) -> bool {
        self.output_text.is_empty()
            && self.thinking_text.as_deref().is_none_or(str::is_empty)
            && self.new_messages.is_empty()
            && self.metadata.is_empty()
            && self.usage.is_empty()
            && !self.is_final
    }
}
