//! # Tool system
//!
//! A [`Tool`] pairs a name, a description and an input JSON Schema with an
//! async handler. Tools are owned by the caller and shared with the
//! orchestrator through `Arc`; the executor only ever reads them.
//!
//! ## Schema formats
//!
//! [`Tool::new`] accepts three notations and normalises them to a JSON Schema
//! object:
//!
//! - **Simple notation**: `{"location": "string", "units": "string"}`
//! - **Extended properties**: `{"limit": {"type": "integer", "optional": true}}`
//! - **Full JSON Schema**: passed through unchanged
//!
//! ## Example
//!
//! ```rust,no_run
//! use agent_orchestra::tool;
//! use serde_json::json;
//!
//! let weather = tool("get_weather", "Get current weather for a location")
//!     .param("location", "string")
//!     .build(|args| async move {
//!         let location = args["location"].as_str().unwrap_or("Unknown");
//!         Ok(json!({"location": location, "temperature": 22}))
//!     });
//! ```
//!
//! ## Synthetic result tool
//!
//! Adapters without native structured output get the caller's output schema
//! as an ordinary tool named [`RETURN_RESULT_TOOL`]. Calling it is how the
//! model hands back its typed answer; see [`SyntheticResultTool`].

use crate::adapter::ToolDefinition;
use crate::{Error, Result};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Name of the synthetic tool used to emulate structured output
pub const RETURN_RESULT_TOOL: &str = "return_result";

/// Type-erased async tool handler.
///
/// Stored behind `Arc` so the executor can hand a clone to each spawned
/// invocation without copying the closure.
pub type ToolHandler =
    Arc<dyn Fn(Value) -> Pin<Box<dyn Future<Output = Result<Value>> + Send>> + Send + Sync>;

/// Tool definition plus its handler.
#[derive(Clone)]
pub struct Tool {
    name: String,
    description: String,
    input_schema: Value,
    handler: ToolHandler,
}

impl Tool {
    /// Create a new tool; the schema is normalised to JSON Schema.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self::from_json_schema(name, description, normalize_schema(input_schema), handler)
    }

    /// Create a tool whose input schema is already JSON Schema and is used as given.
    pub fn from_json_schema<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        handler: F,
    ) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    /// Run the handler with the given arguments.
    pub async fn execute(&self, arguments: Value) -> Result<Value> {
        (self.handler)(arguments).await
    }

    /// A cheap clone of the handler, used when dispatching onto a task
    pub(crate) fn handler(&self) -> ToolHandler {
        Arc::clone(&self.handler)
    }

    /// What the model adapter sees of this tool
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn input_schema(&self) -> &Value {
        &self.input_schema
    }
}

impl std::fmt::Debug for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .finish()
    }
}

/// Keywords that mark an object as an already-written JSON Schema
const SCHEMA_KEYWORDS: &[&str] = &[
    "properties",
    "items",
    "enum",
    "additionalProperties",
    "$schema",
    "anyOf",
    "oneOf",
];

fn is_json_schema(obj: &Map<String, Value>) -> bool {
    let Some(Value::String(_)) = obj.get("type") else {
        return false;
    };
    obj.len() == 1 || SCHEMA_KEYWORDS.iter().any(|k| obj.contains_key(*k))
}

/// Normalises simple and extended notations to a JSON Schema object.
fn normalize_schema(schema: Value) -> Value {
    let Value::Object(obj) = schema else {
        return json!({"type": "object", "properties": {}, "required": []});
    };

    if is_json_schema(&obj) {
        return Value::Object(obj);
    }

    let mut properties = Map::new();
    let mut required = Vec::new();

    for (param_name, param_type) in obj {
        match param_type {
            Value::String(type_str) => {
                properties.insert(param_name.clone(), type_to_json_schema(&type_str));
                required.push(param_name);
            }
            Value::Object(mut prop) => {
                // "optional" and per-property "required" are our notation, not JSON Schema
                let is_optional = prop
                    .remove("optional")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                let is_required = prop.remove("required").and_then(|v| v.as_bool());
                let has_default = prop.contains_key("default");

                properties.insert(param_name.clone(), Value::Object(prop));

                match is_required {
                    Some(true) => required.push(param_name),
                    Some(false) => {}
                    None if !is_optional && !has_default => required.push(param_name),
                    None => {}
                }
            }
            _ => {}
        }
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

fn type_to_json_schema(type_str: &str) -> Value {
    let json_type = match type_str {
        "string" | "str" => "string",
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => "integer",
        "number" | "float" | "f32" | "f64" => "number",
        "boolean" | "bool" => "boolean",
        "array" | "list" | "vec" => "array",
        "object" | "dict" | "map" => "object",
        // unknown types fall back to string
        _ => "string",
    };

    json!({ "type": json_type })
}

/// Fluent builder for [`Tool`]
pub struct ToolBuilder {
    name: String,
    description: String,
    schema: Value,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: json!({}),
        }
    }

    /// Replace the schema entirely
    pub fn schema(mut self, schema: Value) -> Self {
        self.schema = schema;
        self
    }

    /// Add one parameter in simple type notation
    pub fn param(mut self, name: &str, type_str: &str) -> Self {
        if !self.schema.is_object() {
            self.schema = json!({});
        }
        if let Value::Object(obj) = &mut self.schema {
            obj.insert(name.to_string(), Value::String(type_str.to_string()));
        }
        self
    }

    pub fn build<F, Fut>(self, handler: F) -> Tool
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Tool::new(self.name, self.description, self.schema, handler)
    }
}

/// Start building a tool
pub fn tool(name: impl Into<String>, description: impl Into<String>) -> ToolBuilder {
    ToolBuilder::new(name, description)
}

/// Tools available to one call, looked up by name.
///
/// Keeps registration order so adapters receive definitions deterministically.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry, rejecting duplicate names.
    pub fn from_tools(tools: impl IntoIterator<Item = Arc<Tool>>) -> Result<Self> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, tool: Arc<Tool>) -> Result<()> {
        if self.index.contains_key(tool.name()) {
            return Err(Error::tool(format!(
                "Tool '{}' is registered more than once",
                tool.name()
            )));
        }
        self.index.insert(tool.name().to_string(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Tool>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// The output schema exposed to the model as a callable tool.
///
/// Tool inputs must be objects for most vendors, so a non-object schema is
/// wrapped under a single `result` property and unwrapped again by
/// [`SyntheticResultTool::extract`].
#[derive(Debug, Clone)]
pub struct SyntheticResultTool {
    tool: Arc<Tool>,
    wrapped: bool,
}

impl SyntheticResultTool {
    pub fn new(output_schema: &Value) -> Self {
        let is_object_schema = output_schema.get("type").and_then(Value::as_str) == Some("object");
        let input_schema = if is_object_schema {
            output_schema.clone()
        } else {
            json!({
                "type": "object",
                "properties": { "result": output_schema },
                "required": ["result"]
            })
        };

        // Echo the validated arguments back; the orchestrator turns them into the answer
        let tool = Tool::from_json_schema(
            RETURN_RESULT_TOOL,
            "Return the final result to the user. Call this exactly once, with arguments \
             matching the required output schema, when the answer is complete.",
            input_schema,
            |args| async move { Ok(args) },
        );

        Self {
            tool: Arc::new(tool),
            wrapped: !is_object_schema,
        }
    }

    pub fn tool(&self) -> Arc<Tool> {
        Arc::clone(&self.tool)
    }

    /// The typed answer carried by a call's arguments
    pub fn extract(&self, arguments: &Value) -> Value {
        if self.wrapped {
            arguments.get("result").cloned().unwrap_or(Value::Null)
        } else {
            arguments.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_type_to_json_schema() {
        assert_eq!(type_to_json_schema("string"), json!({"type": "string"}));
        assert_eq!(type_to_json_schema("i64"), json!({"type": "integer"}));
        assert_eq!(type_to_json_schema("bool"), json!({"type": "boolean"}));
        assert_eq!(type_to_json_schema("mystery"), json!({"type": "string"}));
    }

    #[test]
    fn test_normalize_simple_schema() {
        let result = normalize_schema(json!({"location": "string", "units": "string"}));
        assert_eq!(result["type"], "object");
        assert_eq!(result["properties"]["location"]["type"], "string");
        assert_eq!(result["required"], json!(["location", "units"]));
    }

    #[test]
    fn test_normalize_extended_schema() {
        let result = normalize_schema(json!({
            "query": {"type": "string"},
            "limit": {"type": "integer", "optional": true},
            "page": {"type": "integer", "default": 1},
            "strict": {"type": "boolean", "required": true, "default": false}
        }));
        let required = result["required"].as_array().unwrap();
        assert!(required.contains(&json!("query")));
        assert!(required.contains(&json!("strict")));
        assert!(!required.contains(&json!("limit")));
        assert!(!required.contains(&json!("page")));
        assert!(result["properties"]["limit"].get("optional").is_none());
    }

    #[test]
    fn test_normalize_full_schema_passthrough() {
        let schema = json!({
            "type": "object",
            "properties": {"n": {"type": "integer"}},
            "required": ["n"]
        });
        assert_eq!(normalize_schema(schema.clone()), schema);
        assert_eq!(normalize_schema(json!({"type": "object"})), json!({"type": "object"}));
    }

    #[tokio::test]
    async fn test_tool_creation_and_execution() {
        let add = tool("add", "Add two numbers")
            .param("a", "number")
            .param("b", "number")
            .build(|args| async move {
                let a = args["a"]
                    .as_f64()
                    .ok_or_else(|| Error::invalid_input("Parameter 'a' must be a number"))?;
                let b = args["b"]
                    .as_f64()
                    .ok_or_else(|| Error::invalid_input("Parameter 'b' must be a number"))?;
                Ok(json!({"result": a + b}))
            });

        assert_eq!(add.name(), "add");
        let result = add.execute(json!({"a": 5.0, "b": 3.0})).await.unwrap();
        assert_eq!(result["result"], 8.0);
        assert!(add.execute(json!({"a": "x"})).await.is_err());
    }

    #[test]
    fn test_param_after_non_object_schema() {
        let t = tool("t", "test")
            .schema(json!("string"))
            .param("key", "number")
            .build(|_| async { Ok(json!({})) });
        assert_eq!(t.input_schema()["properties"]["key"]["type"], "number");
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let a = Arc::new(tool("dup", "a").build(|_| async { Ok(json!(1)) }));
        let b = Arc::new(tool("dup", "b").build(|_| async { Ok(json!(2)) }));
        let err = ToolRegistry::from_tools([a, b]).unwrap_err();
        assert!(matches!(err, Error::Tool(_)));
    }

    #[test]
    fn test_registry_keeps_order() {
        let tools = ["b", "a", "c"]
            .into_iter()
            .map(|n| Arc::new(tool(n, n).build(|_| async { Ok(json!(null)) })));
        let registry = ToolRegistry::from_tools(tools).unwrap();
        let names: Vec<_> = registry.definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(names, ["b", "a", "c"]);
        assert!(registry.get("a").is_some());
        assert!(registry.get("zzz").is_none());
    }

    #[tokio::test]
    async fn test_synthetic_tool_echoes_object_arguments() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "integer"}}});
        let synthetic = SyntheticResultTool::new(&schema);
        assert_eq!(synthetic.tool().name(), RETURN_RESULT_TOOL);
        assert_eq!(synthetic.tool().input_schema(), &schema);

        let echoed = synthetic.tool().execute(json!({"n": 5})).await.unwrap();
        assert_eq!(synthetic.extract(&echoed), json!({"n": 5}));
    }

    #[test]
    fn test_synthetic_tool_wraps_scalar_schema() {
        let synthetic = SyntheticResultTool::new(&json!({"type": "string"}));
        let schema = synthetic.tool().input_schema().clone();
        assert_eq!(schema["properties"]["result"]["type"], "string");
        assert_eq!(synthetic.extract(&json!({"result": "hi"})), json!("hi"));
    }

    #[test]
    fn test_synthetic_tool_keeps_schema_verbatim() {
        // no `properties`, so the simple-notation reading would misparse it
        let schema = json!({"type": "object", "description": "free-form answer"});
        let synthetic = SyntheticResultTool::new(&schema);
        assert_eq!(synthetic.tool().input_schema(), &schema);
        assert_eq!(synthetic.tool().definition().input_schema, schema);
    }

    #[test]
    fn test_handler_errors_are_returned() {
        let broken = tool("broken", "always fails")
            .build(|_| async move { Err(Error::tool("no such file")) });
        let result = tokio_test::block_on(broken.execute(json!({})));
        tokio_test::assert_err!(result);
    }
}
