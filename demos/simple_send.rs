//! Simple send example
//!
//! Streams one tool-assisted answer. Talks to an OpenAI-compatible server
//! when `AGENT_MODEL` is set (with `AGENT_BASE_URL` / `AGENT_API_KEY`), and
//! to a scripted mock otherwise.
//!
//! ```text
//! RUST_LOG=debug AGENT_MODEL=qwen3:8b AGENT_BASE_URL=http://localhost:11434/v1 \
//!     cargo run --example simple_send
//! ```

use agent_orchestra::{
    Agent, AgentOptions, MockAdapter, MockTurn, ModelAdapter, OpenAiAdapter, OpenAiConfig,
    get_model, tool,
};
use futures::StreamExt;
use serde_json::json;
use std::io::Write;
use std::sync::Arc;

fn adapter() -> anyhow::Result<Arc<dyn ModelAdapter>> {
    if get_model(None, true).is_some() {
        let config = OpenAiConfig::from_env()?;
        println!("Using {} at {}\n", config.model(), config.base_url());
        return Ok(Arc::new(OpenAiAdapter::new(config)?));
    }

    println!("AGENT_MODEL not set, using a scripted mock\n");
    let mock = MockAdapter::new()
        .with_turn(
            MockTurn::new()
                .text("Let me add those. ")
                .tool_call("call_1", "add", json!({"a": 2, "b": 3})),
        )
        .with_turn(MockTurn::new().text("2 + 3 = 5").usage(42, 7));
    Ok(Arc::new(mock))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let add = tool("add", "Add two numbers")
        .param("a", "number")
        .param("b", "number")
        .build(|args| async move {
            let a = args["a"].as_f64().unwrap_or(0.0);
            let b = args["b"].as_f64().unwrap_or(0.0);
            Ok(json!(a + b))
        });

    let options = AgentOptions::builder()
        .system_prompt("You are a calculator. Use the add tool for arithmetic.")
        .tool(add)
        .max_iterations(5)
        .build()?;

    let agent = Agent::new(adapter()?, options);
    let mut stream = agent.send_stream("What is 2 + 3?", &[]).await?;

    print!("Response: ");
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        print!("{}", chunk.output_text);
        std::io::stdout().flush()?;

        for message in &chunk.new_messages {
            for call in message.tool_calls() {
                println!("\n[tool] {}({})", call.name, call.arguments);
            }
            for result in message.tool_results() {
                println!("[result] {} -> {}", result.name, result.content);
            }
        }

        if chunk.is_final {
            println!(
                "\n\nTokens: {:?} in / {:?} out",
                chunk.usage.input_tokens, chunk.usage.output_tokens
            );
        }
    }

    Ok(())
}
