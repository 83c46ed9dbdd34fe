//! OpenAI-compatible chat completions adapter.
//!
//! Works against any server speaking the `/chat/completions` streaming
//! protocol (OpenAI, LM Studio, Ollama, llama.cpp, vLLM). Requests are always
//! streamed; the Server-Sent Events body is translated into [`Chunk`]s:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"The "}}]}                 -> Chunk::text("The ")
//! data: {"choices":[{"delta":{"reasoning_content":"hmm"}}]}        -> thinking
//! data: {"choices":[{"delta":{"tool_calls":[{"index":0,...}]}}]}   -> partial tool-call stub
//! data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}    -> complete tool calls
//! data: {"choices":[],"usage":{"prompt_tokens":9,...}}              -> usage
//! data: [DONE]                                                      -> final marker
//! ```
//!
//! Tool-call arguments arrive as fragments of one JSON string, interleaved
//! across calls by `index`. Every fragment re-emits the call as a partial
//! stub so consumers can show progress; once the model finishes, calls whose
//! arguments parse are emitted complete and replace their stubs. Calls that
//! never parse stay stubs and are reported back to the model as failures
//! when the message is consolidated.

use crate::adapter::{Capabilities, ChunkStream, ModelAdapter, StreamOptions};
use crate::config::{Provider, get_api_key, get_base_url, get_model};
use crate::retry::{RetryConfig, retry_with_backoff_conditional};
use crate::types::{Chunk, Message, Part, Role, ToolCallPart, Usage};
use crate::{Error, Result};
use async_stream::try_stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::time::Duration;

/// Connection and request settings for [`OpenAiAdapter`]
#[derive(Clone)]
pub struct OpenAiConfig {
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    capabilities: Capabilities,
    retry: RetryConfig,
}

impl std::fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("timeout", &self.timeout)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl OpenAiConfig {
    pub fn builder() -> OpenAiConfigBuilder {
        OpenAiConfigBuilder::default()
    }

    /// Reads `AGENT_BASE_URL`, `AGENT_MODEL` and `AGENT_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let model = get_model(None, true)
            .ok_or_else(|| Error::config("AGENT_MODEL is not set"))?;
        let mut builder = Self::builder()
            .base_url(get_base_url(None, None))
            .model(model);
        if let Some(key) = get_api_key() {
            builder = builder.api_key(key);
        }
        builder.build()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }
}

/// Builder for [`OpenAiConfig`]
#[derive(Debug, Default)]
pub struct OpenAiConfigBuilder {
    base_url: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    timeout: Option<Duration>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    capabilities: Option<Capabilities>,
    retry: Option<RetryConfig>,
}

impl OpenAiConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Use a well-known server's default URL
    pub fn provider(mut self, provider: Provider) -> Self {
        self.base_url = Some(provider.default_url().to_string());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn max_tokens(mut self, tokens: u32) -> Self {
        self.max_tokens = Some(tokens);
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Override the declared capabilities, e.g. for servers without
    /// `response_format` support
    pub fn capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<OpenAiConfig> {
        let model = self
            .model
            .filter(|m| !m.is_empty())
            .ok_or_else(|| Error::config("model is required"))?;
        let base_url = self
            .base_url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::config("base_url is required"))?;

        if let Some(temperature) = self.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(Error::config("temperature must be between 0.0 and 2.0"));
            }
        }

        Ok(OpenAiConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key: self.api_key,
            timeout: self.timeout.unwrap_or(Duration::from_secs(120)),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            capabilities: self.capabilities.unwrap_or_else(Capabilities::full),
            retry: self.retry.unwrap_or_default(),
        })
    }
}

/// Streams chat completions from an OpenAI-compatible server
#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    config: OpenAiConfig,
    http: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(Error::Http)?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    fn build_request(&self, history: &[Message], options: &StreamOptions) -> Result<WireRequest> {
        let tools = options.has_tools().then(|| {
            options
                .tools
                .iter()
                .map(|t| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": t.name,
                            "description": t.description,
                            "parameters": t.input_schema,
                        }
                    })
                })
                .collect()
        });

        let response_format = options.output_schema.as_ref().map(|schema| {
            json!({
                "type": "json_schema",
                "json_schema": {"name": "result", "schema": schema}
            })
        });

        Ok(WireRequest {
            model: self.config.model.clone(),
            messages: to_wire_messages(history)?,
            stream: true,
            stream_options: json!({"include_usage": true}),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            tools,
            response_format,
        })
    }

    async fn open(&self, request: &WireRequest) -> Result<reqwest::Response> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::timeout()
            } else {
                Error::Http(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("failed to read error body: {}", e));
            return Err(Error::api(format!("API error {}: {}", status, body)));
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelAdapter for OpenAiAdapter {
    fn name(&self) -> &str {
        "openai"
    }

    fn capabilities(&self) -> Capabilities {
        self.config.capabilities
    }

    async fn send_stream(
        &self,
        history: &[Message],
        options: &StreamOptions,
    ) -> Result<ChunkStream> {
        let request = self.build_request(history, options)?;
        log::debug!(
            "POST {}/chat/completions model={} messages={}",
            self.config.base_url,
            request.model,
            request.messages.len()
        );

        let response =
            retry_with_backoff_conditional(self.config.retry.clone(), || self.open(&request))
                .await?;

        let mut events = Box::pin(response.bytes_stream().eventsource());
        Ok(Box::pin(try_stream! {
            let mut translator = DeltaTranslator::new();
            while let Some(event) = events.next().await {
                let event = event.map_err(|e| Error::stream(e.to_string()))?;
                let data = event.data.trim();
                if data == "[DONE]" {
                    break;
                }
                if data.is_empty() {
                    continue;
                }

                let chunk: WireChunk = serde_json::from_str(data)
                    .map_err(|e| Error::stream(format!("Failed to parse chunk: {}", e)))?;
                for out in translator.process(chunk) {
                    yield out;
                }
            }

            for out in translator.finish() {
                yield out;
            }
            yield Chunk::final_marker();
        }))
    }
}

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    stream_options: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: WireContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum WireContent {
    Text(String),
    Parts(Vec<Value>),
}

impl WireMessage {
    fn text(role: &'static str, text: String) -> Self {
        Self {
            role,
            content: WireContent::Text(text),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// Maps the conversation onto chat-completions messages.
///
/// Tool results become one `tool` message each. Link parts become
/// `image_url` content parts; inline data has no portable encoding here and
/// is rejected.
fn to_wire_messages(history: &[Message]) -> Result<Vec<WireMessage>> {
    let mut wire = Vec::with_capacity(history.len());

    for message in history {
        match message.role {
            Role::System => wire.push(WireMessage::text("system", message.text())),
            Role::Model => {
                let calls: Vec<Value> = message
                    .tool_calls()
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": call.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let mut out = WireMessage::text("assistant", message.text());
                if !calls.is_empty() {
                    out.tool_calls = Some(calls);
                }
                wire.push(out);
            }
            Role::User => {
                for result in message.tool_results() {
                    let content = match &result.content {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    let mut out = WireMessage::text("tool", content);
                    out.tool_call_id = Some(result.call_id.clone());
                    wire.push(out);
                }

                let mut parts = Vec::new();
                let mut has_links = false;
                for part in &message.parts {
                    match part {
                        Part::Text(text) => parts.push(json!({"type": "text", "text": text.text})),
                        Part::Link(link) => {
                            let is_image = link
                                .mime_type
                                .as_deref()
                                .is_none_or(|m| m.starts_with("image/"));
                            if !is_image {
                                return Err(Error::unsupported(format!(
                                    "link attachments of type {:?}",
                                    link.mime_type
                                )));
                            }
                            has_links = true;
                            parts.push(json!({"type": "image_url", "image_url": {"url": link.url}}));
                        }
                        Part::Data(data) => {
                            return Err(Error::unsupported(format!(
                                "inline {} attachments",
                                data.mime_type
                            )));
                        }
                        Part::ToolCall(_) | Part::ToolResult(_) => {}
                    }
                }

                if has_links {
                    wire.push(WireMessage {
                        role: "user",
                        content: WireContent::Parts(parts),
                        tool_calls: None,
                        tool_call_id: None,
                    });
                } else if !parts.is_empty() || message.tool_results().is_empty() {
                    wire.push(WireMessage::text("user", message.text()));
                }
            }
        }
    }

    Ok(wire)
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    reasoning_content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<WireToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct WireToolCallDelta {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens: Option<u64>,
}

#[derive(Debug, Default)]
struct PendingCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl PendingCall {
    fn stub(&self) -> Option<ToolCallPart> {
        let (Some(id), Some(name)) = (&self.id, &self.name) else {
            return None;
        };
        Some(ToolCallPart::partial(id, name, self.arguments.as_str()))
    }
}

/// Turns chat-completions deltas into chunks.
///
/// Calls are keyed by the server's `index` so interleaved deltas for
/// several calls land on the right one.
#[derive(Debug, Default)]
struct DeltaTranslator {
    calls: BTreeMap<u32, PendingCall>,
}

impl DeltaTranslator {
    fn new() -> Self {
        Self::default()
    }

    fn process(&mut self, chunk: WireChunk) -> Vec<Chunk> {
        let mut out = Vec::new();

        for choice in chunk.choices {
            if let Some(thinking) = choice.delta.reasoning_content.filter(|t| !t.is_empty()) {
                out.push(Chunk::default().with_thinking(thinking));
            }

            if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                out.push(Chunk::text(content));
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let entry = self.calls.entry(delta.index).or_default();
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    entry.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        entry.name = Some(name);
                    }
                    if let Some(arguments) = function.arguments {
                        entry.arguments.push_str(&arguments);
                    }
                }
                if let Some(stub) = entry.stub() {
                    out.push(call_chunk(stub));
                }
            }

            if choice.finish_reason.is_some() {
                out.extend(self.finish());
            }
        }

        if let Some(usage) = chunk.usage {
            out.push(
                Chunk::default().with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens)),
            );
        }

        out
    }

    /// Emits every call whose arguments parse as a complete call.
    fn finish(&mut self) -> Vec<Chunk> {
        let mut out = Vec::new();
        for (index, pending) in std::mem::take(&mut self.calls) {
            let (Some(id), Some(name)) = (pending.id, pending.name) else {
                log::warn!("dropping tool call at index {} without id or name", index);
                continue;
            };

            let arguments = if pending.arguments.trim().is_empty() {
                Ok(Value::Object(Map::new()))
            } else {
                serde_json::from_str::<Value>(&pending.arguments)
            };

            match arguments {
                Ok(arguments) => out.push(call_chunk(ToolCallPart::new(id, name, arguments))),
                // the last stub stays in place and is reported at consolidation
                Err(e) => log::debug!("tool call {} arguments did not parse: {}", id, e),
            }
        }
        out
    }
}

fn call_chunk(call: ToolCallPart) -> Chunk {
    Chunk::messages(vec![Message::model_with_parts(vec![Part::ToolCall(call)])])
}
