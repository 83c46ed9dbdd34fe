//! Agent options and endpoint helpers

use crate::tools::Tool;
use crate::{Error, Result};
use serde_json::Value;
use std::env;
use std::str::FromStr;
use std::sync::Arc;

/// Default ceiling on model requests per call
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Environment variable overriding the adapter base URL
pub const BASE_URL_ENV: &str = "AGENT_BASE_URL";
/// Environment variable overriding the model name
pub const MODEL_ENV: &str = "AGENT_MODEL";
/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "AGENT_API_KEY";

/// Per-agent settings, fixed for the agent's lifetime
#[derive(Clone)]
pub struct AgentOptions {
    system_prompt: Option<String>,
    max_iterations: usize,
    tools: Vec<Arc<Tool>>,
    output_schema: Option<Value>,
}

impl std::fmt::Debug for AgentOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptions")
            .field("system_prompt", &self.system_prompt)
            .field("max_iterations", &self.max_iterations)
            .field("tools", &format!("{} tools", self.tools.len()))
            .field("output_schema", &self.output_schema.is_some())
            .finish()
    }
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            system_prompt: None,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tools: Vec::new(),
            output_schema: None,
        }
    }
}

impl AgentOptions {
    pub fn builder() -> AgentOptionsBuilder {
        AgentOptionsBuilder::default()
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_deref()
    }

    /// Most model requests one call may issue
    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn tools(&self) -> &[Arc<Tool>] {
        &self.tools
    }

    /// JSON Schema the final answer must satisfy, if any
    pub fn output_schema(&self) -> Option<&Value> {
        self.output_schema.as_ref()
    }
}

/// Builder for [`AgentOptions`]
#[derive(Default)]
pub struct AgentOptionsBuilder {
    system_prompt: Option<String>,
    max_iterations: Option<usize>,
    tools: Vec<Arc<Tool>>,
    output_schema: Option<Value>,
}

impl std::fmt::Debug for AgentOptionsBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentOptionsBuilder")
            .field("system_prompt", &self.system_prompt)
            .field("max_iterations", &self.max_iterations)
            .field("tools", &format!("{} tools", self.tools.len()))
            .finish()
    }
}

impl AgentOptionsBuilder {
    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }

    pub fn tool(mut self, tool: Tool) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    pub fn tools(mut self, tools: Vec<Tool>) -> Self {
        self.tools.extend(tools.into_iter().map(Arc::new));
        self
    }

    /// Register a tool that is also used elsewhere
    pub fn shared_tool(mut self, tool: Arc<Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    pub fn build(self) -> Result<AgentOptions> {
        let max_iterations = self.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }

        if let Some(schema) = &self.output_schema {
            if !schema.is_object() {
                return Err(Error::config("output_schema must be a JSON Schema object"));
            }
        }

        Ok(AgentOptions {
            system_prompt: self.system_prompt.filter(|p| !p.is_empty()),
            max_iterations,
            tools: self.tools,
            output_schema: self.output_schema,
        })
    }
}

/// Well-known OpenAI-compatible endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    LMStudio,
    Ollama,
    LlamaCpp,
    VLLM,
}

impl Provider {
    pub fn default_url(&self) -> &'static str {
        match self {
            Provider::OpenAI => "https://api.openai.com/v1",
            Provider::LMStudio => "http://localhost:1234/v1",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::LlamaCpp => "http://localhost:8080/v1",
            Provider::VLLM => "http://localhost:8000/v1",
        }
    }
}

impl FromStr for Provider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAI),
            "lmstudio" | "lm-studio" | "lm_studio" => Ok(Provider::LMStudio),
            "ollama" => Ok(Provider::Ollama),
            "llamacpp" | "llama-cpp" | "llama_cpp" | "llama.cpp" => Ok(Provider::LlamaCpp),
            "vllm" => Ok(Provider::VLLM),
            other => Err(Error::config(format!("unknown provider '{}'", other))),
        }
    }
}

/// Base URL from `AGENT_BASE_URL`, then the provider default, then `fallback`,
/// then the OpenAI endpoint.
pub fn get_base_url(provider: Option<Provider>, fallback: Option<&str>) -> String {
    resolve_base_url(env::var(BASE_URL_ENV).ok(), provider, fallback)
}

fn resolve_base_url(
    from_env: Option<String>,
    provider: Option<Provider>,
    fallback: Option<&str>,
) -> String {
    if let Some(url) = from_env.filter(|u| !u.is_empty()) {
        return url;
    }
    if let Some(p) = provider {
        return p.default_url().to_string();
    }
    fallback
        .unwrap_or(Provider::OpenAI.default_url())
        .to_string()
}

/// Model name from `AGENT_MODEL` (when `prefer_env`), else `fallback`
pub fn get_model(fallback: Option<&str>, prefer_env: bool) -> Option<String> {
    let from_env = if prefer_env {
        env::var(MODEL_ENV).ok()
    } else {
        None
    };
    from_env
        .filter(|m| !m.is_empty())
        .or_else(|| fallback.map(str::to_string))
}

/// API key from `AGENT_API_KEY`
pub fn get_api_key() -> Option<String> {
    env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty())
}
