//! Typed output example
//!
//! Asks for an answer matching a JSON Schema and decodes it into a struct.
//! Against the mock, the adapter declares no native schema support, so the
//! answer arrives through the synthetic `return_result` tool.

use agent_orchestra::{
    Agent, AgentOptions, MockAdapter, ModelAdapter, OpenAiAdapter, OpenAiConfig, get_model,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct City {
    name: String,
    country: String,
    population: u64,
}

fn adapter() -> anyhow::Result<Arc<dyn ModelAdapter>> {
    if get_model(None, true).is_some() {
        return Ok(Arc::new(OpenAiAdapter::new(OpenAiConfig::from_env()?)?));
    }
    Ok(Arc::new(MockAdapter::new().with_tool_turn(
        "call_1",
        "return_result",
        json!({"name": "Paris", "country": "France", "population": 2102650}),
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = AgentOptions::builder()
        .system_prompt("Answer with facts only.")
        .output_schema(json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "country": {"type": "string"},
                "population": {"type": "integer"}
            },
            "required": ["name", "country", "population"]
        }))
        .build()?;

    let agent = Agent::new(adapter()?, options);
    let typed = agent
        .send_for::<City>("What is the capital of France?", &[])
        .await?;

    println!("{:#?}", typed.value);
    println!(
        "{} has about {} inhabitants ({})",
        typed.value.name, typed.value.population, typed.value.country
    );
    if let Some(message) = typed.response.final_message() {
        println!("raw: {}", message.text());
    }

    Ok(())
}
