//! Typed output integration tests
//!
//! Native schema, synthetic `return_result` tool and the double-agent
//! protocol, all observed through the public `Agent` API.

use agent_orchestra::{
    Agent, AgentOptions, Capabilities, Chunk, Error, MockAdapter, MockTurn, SUPPRESSED_TEXT_KEY,
    tool,
};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

#[derive(Debug, Deserialize, PartialEq)]
struct Answer {
    n: i64,
}

fn schema() -> Value {
    json!({"type": "object", "properties": {"n": {"type": "integer"}}, "required": ["n"]})
}

fn lookup() -> agent_orchestra::Tool {
    tool("lookup", "Look a number up")
        .param("key", "string")
        .build(|_| async move { Ok(json!({"value": 5})) })
}

fn typed_options() -> AgentOptions {
    AgentOptions::builder().output_schema(schema()).build().unwrap()
}

async fn collect(agent: &Agent, prompt: &str) -> Vec<Chunk> {
    agent
        .send_stream(prompt, &[])
        .await
        .unwrap()
        .map(|c| c.unwrap())
        .collect()
        .await
}

/// Property: native text and the synthetic tool decode to the same value
#[tokio::test]
async fn test_native_and_synthetic_agree() {
    let native = Arc::new(
        MockAdapter::new()
            .with_capabilities(Capabilities::chat_only().with_native_schema(true))
            .with_text_turn("{\"n\": 5}"),
    );
    let synthetic = Arc::new(MockAdapter::new().with_tool_turn(
        "r1",
        "return_result",
        json!({"n": 5}),
    ));

    let from_native = Agent::new(native.clone(), typed_options())
        .send_for::<Answer>("five", &[])
        .await
        .unwrap();
    let from_synthetic = Agent::new(synthetic, typed_options())
        .send_for::<Answer>("five", &[])
        .await
        .unwrap();

    assert_eq!(from_native.value, Answer { n: 5 });
    assert_eq!(from_native.value, from_synthetic.value);

    // the native path hands the schema to the vendor and adds no tools
    let request = &native.requests()[0];
    assert_eq!(request.options.output_schema, Some(schema()));
    assert!(request.options.tools.is_empty());
}

/// Test: a plain-text reply also ends the synthetic loop
#[tokio::test]
async fn test_synthetic_accepts_plain_text_answer() {
    let adapter = Arc::new(MockAdapter::new().with_text_turn("{\"n\":7}"));
    let typed = Agent::new(adapter, typed_options())
        .send_for::<Answer>("seven", &[])
        .await
        .unwrap();
    assert_eq!(typed.value, Answer { n: 7 });
}

/// Test: prose from tool turns is held back, then attached to the answer
#[tokio::test]
async fn test_synthetic_suppresses_tool_turn_text() {
    let adapter = Arc::new(
        MockAdapter::new()
            .with_turn(
                MockTurn::new()
                    .text("Let me look that up.")
                    .tool_call("l1", "lookup", json!({"key": "n"})),
            )
            .with_tool_turn("r1", "return_result", json!({"n": 5})),
    );
    let options = AgentOptions::builder()
        .output_schema(schema())
        .tool(lookup())
        .build()
        .unwrap();
    let agent = Agent::new(adapter.clone(), options);

    let chunks = collect(&agent, "what is n?").await;
    let forwarded: String = chunks.iter().map(|c| c.output_text.as_str()).collect();
    assert_eq!(forwarded, "{\"n\":5}");

    let terminal = chunks
        .iter()
        .flat_map(|c| c.new_messages.iter())
        .last()
        .unwrap();
    assert_eq!(terminal.text(), "{\"n\":5}");
    assert_eq!(
        terminal.metadata[SUPPRESSED_TEXT_KEY],
        json!("Let me look that up.")
    );

    // the caller's tool and the result tool are both offered
    let names: Vec<_> = adapter.requests()[0]
        .options
        .tools
        .iter()
        .map(|t| t.name.clone())
        .collect();
    assert_eq!(names, vec!["lookup", "return_result"]);
}

/// Test: an object schema without `properties` reaches the model unchanged
#[tokio::test]
async fn test_synthetic_tool_uses_schema_as_given() {
    let free_form = json!({"type": "object", "description": "free-form answer"});
    let adapter = Arc::new(MockAdapter::new().with_tool_turn(
        "r1",
        "return_result",
        json!({"summary": "ok"}),
    ));
    let options = AgentOptions::builder()
        .output_schema(free_form.clone())
        .build()
        .unwrap();

    let response = Agent::new(adapter.clone(), options)
        .send("summarise", &[])
        .await
        .unwrap();

    let definition = &adapter.requests()[0].options.tools[0];
    assert_eq!(definition.name, "return_result");
    assert_eq!(definition.input_schema, free_form);
    assert_eq!(response.output, "{\"summary\":\"ok\"}");
}

/// Test: both synthetic termination paths carry the held-back prose
#[tokio::test]
async fn test_synthetic_text_answer_carries_suppressed_text() {
    let adapter = Arc::new(
        MockAdapter::new()
            .with_turn(
                MockTurn::new()
                    .text("Let me look that up.")
                    .tool_call("l1", "lookup", json!({"key": "n"})),
            )
            .with_text_turn("{\"n\":5}"),
    );
    let options = AgentOptions::builder()
        .output_schema(schema())
        .tool(lookup())
        .build()
        .unwrap();

    let typed = Agent::new(adapter, options)
        .send_for::<Answer>("what is n?", &[])
        .await
        .unwrap();

    assert_eq!(typed.value, Answer { n: 5 });
    let last = typed.response.final_message().unwrap();
    assert_eq!(
        last.metadata[SUPPRESSED_TEXT_KEY],
        json!("Let me look that up.")
    );
    assert_eq!(typed.response.output, "{\"n\":5}");
}

/// Test: a malformed result call lets the model try again
#[tokio::test]
async fn test_synthetic_retries_after_bad_result_call() {
    let adapter = Arc::new(
        MockAdapter::new()
            .with_turn(MockTurn::new().streamed_tool_call("r1", "return_result", "{\"n\": "))
            .with_tool_turn("r2", "return_result", json!({"n": 5})),
    );
    let agent = Agent::new(adapter.clone(), typed_options());

    let typed = agent.send_for::<Answer>("five", &[]).await.unwrap();
    assert_eq!(typed.value, Answer { n: 5 });
    assert_eq!(adapter.request_count(), 2);
}

/// Test: the result tool name cannot be claimed by a caller tool
#[tokio::test]
async fn test_result_tool_name_is_reserved() {
    let impostor = tool("return_result", "not ours").build(|a| async move { Ok(a) });
    let adapter = Arc::new(MockAdapter::new().with_text_turn("unused"));
    let options = AgentOptions::builder()
        .output_schema(schema())
        .tool(impostor)
        .build()
        .unwrap();

    let err = Agent::new(adapter, options)
        .send("x", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tool(_)));
}

/// Test: non-object schemas are wrapped for the tool and unwrapped after
#[tokio::test]
async fn test_synthetic_non_object_schema() {
    let adapter = Arc::new(MockAdapter::new().with_tool_turn(
        "r1",
        "return_result",
        json!({"result": ["a", "b"]}),
    ));
    let options = AgentOptions::builder()
        .output_schema(json!({"type": "array", "items": {"type": "string"}}))
        .build()
        .unwrap();
    let typed = Agent::new(adapter, options)
        .send_for::<Vec<String>>("letters", &[])
        .await
        .unwrap();
    assert_eq!(typed.value, vec!["a", "b"]);
}

fn double_agent_adapter() -> Arc<MockAdapter> {
    Arc::new(
        MockAdapter::new()
            .with_capabilities(
                Capabilities::chat_only()
                    .with_tools(true)
                    .with_native_schema(true),
            )
            .with_turn(
                MockTurn::new()
                    .text("Checking the table. ")
                    .tool_call("l1", "lookup", json!({"key": "n"})),
            )
            .with_text_turn("The value is five.")
            .with_text_turn("{\"n\":5}"),
    )
}

fn double_agent_options() -> AgentOptions {
    AgentOptions::builder()
        .output_schema(schema())
        .tool(lookup())
        .build()
        .unwrap()
}

/// Property: phase-one prose never reaches the caller but is kept as metadata
#[tokio::test]
async fn test_double_agent_suppression() {
    let adapter = double_agent_adapter();
    let agent = Agent::new(adapter.clone(), double_agent_options());

    let chunks = collect(&agent, "what is n?").await;

    let forwarded: String = chunks.iter().map(|c| c.output_text.as_str()).collect();
    assert_eq!(forwarded, "{\"n\":5}");

    let messages: Vec<_> = chunks.iter().flat_map(|c| c.new_messages.clone()).collect();
    let last = messages.last().unwrap();
    assert_eq!(last.text(), "{\"n\":5}");
    let suppressed = last.metadata[SUPPRESSED_TEXT_KEY].as_str().unwrap();
    assert!(suppressed.contains("Checking the table."));
    assert!(suppressed.contains("The value is five."));

    // no phase-one prose travels in forwarded messages, tool turns included
    for message in &messages[..messages.len() - 1] {
        let text = message.text();
        assert!(!text.contains("Checking the table"), "leaked: {text:?}");
        assert!(!text.contains("The value is five"), "leaked: {text:?}");
    }
    agent_orchestra::validate_alternation(&messages).unwrap();

    // nor is it sent back to the model for the schema request
    let phase_two = &adapter.requests()[2];
    assert!(
        phase_two
            .history
            .iter()
            .all(|m| !m.text().contains("Checking the table"))
    );
    // the tool call itself survives
    assert_eq!(phase_two.history[1].tool_calls()[0].id, "l1");
}

/// Test: the two phases send different request shapes
#[tokio::test]
async fn test_double_agent_request_shapes() {
    let adapter = double_agent_adapter();
    let agent = Agent::new(adapter.clone(), double_agent_options());

    let typed = agent.send_for::<Answer>("what is n?", &[]).await.unwrap();
    assert_eq!(typed.value, Answer { n: 5 });

    let requests = adapter.requests();
    assert_eq!(requests.len(), 3);
    for phase_one in &requests[..2] {
        assert_eq!(phase_one.options.tools[0].name, "lookup");
        assert!(phase_one.options.output_schema.is_none());
    }
    let phase_two = &requests[2];
    assert!(phase_two.options.tools.is_empty());
    assert_eq!(phase_two.options.output_schema, Some(schema()));
    // the schema request continues from the tool results
    assert!(!phase_two.history.last().unwrap().tool_results().is_empty());
}

/// Test: the schema request is allowed even when phase one used the budget
#[tokio::test]
async fn test_double_agent_closing_request_beyond_ceiling() {
    let adapter = double_agent_adapter();
    let options = AgentOptions::builder()
        .output_schema(schema())
        .tool(lookup())
        .max_iterations(2)
        .build()
        .unwrap();

    let typed = Agent::new(adapter.clone(), options)
        .send_for::<Answer>("what is n?", &[])
        .await
        .unwrap();
    assert_eq!(typed.value.n, 5);
    assert_eq!(adapter.request_count(), 3);
}

/// Test: no schema path available
#[tokio::test]
async fn test_schema_without_any_capability() {
    let adapter = Arc::new(
        MockAdapter::new()
            .with_capabilities(Capabilities::chat_only())
            .with_text_turn("unused"),
    );
    let err = Agent::new(adapter.clone(), typed_options())
        .send("x", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unsupported(_)));
    assert_eq!(adapter.request_count(), 0);
}

/// Test: decoding errors are reported when the text does not fit the type
#[tokio::test]
async fn test_decode_error_surfaces_to_caller() {
    let adapter = Arc::new(
        MockAdapter::new()
            .with_capabilities(Capabilities::full())
            .with_text_turn("{\"n\": \"five\"}"),
    );
    let err = Agent::new(adapter, typed_options())
        .send_for::<Answer>("five", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Json(_)));
}
