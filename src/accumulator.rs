//! Merging streamed message fragments into one model message.
//!
//! Vendors deliver a model turn as many small pieces: text arrives as deltas,
//! and tool calls may show up as stubs before their argument JSON is complete.
//!
//! ```text
//! fragment 1: Text("The ")
//! fragment 2: Text("time is")
//! fragment 3: ToolCall { id: "c1", name: "get_time", partial: "{\"tz" }
//! fragment 4: ToolCall { id: "c1", name: "get_time", partial: "{\"tz\":\"UTC\"}" }
//!
//! accumulated: [Text("The time is"), ToolCall(c1, partial "{\"tz\":\"UTC\"}")]
//! consolidated: [Text("The time is"), ToolCall(c1, {"tz": "UTC"})]
//! ```
//!
//! Accumulation never fails. Argument JSON that cannot be parsed at
//! consolidation becomes a complete call carrying `argument_error`, which the
//! executor reports back to the model as a failed tool result.

use crate::metadata::merge_events;
use crate::types::{Message, Part, TextPart, ToolCallPart};
use serde_json::{Map, Value};

/// Stateless merge rules for model message fragments
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageAccumulator;

impl MessageAccumulator {
    pub fn new() -> Self {
        Self
    }

    /// Appends `incoming`'s parts onto `previous`.
    ///
    /// - consecutive text parts are concatenated into one
    /// - a tool call replaces an earlier partial stub with the same id
    /// - a tool call repeating the id of a complete call is dropped
    pub fn accumulate(&self, previous: Message, incoming: &Message) -> Message {
        let mut merged = previous;

        for part in &incoming.parts {
            match part {
                Part::Text(text) => push_text(&mut merged.parts, &text.text),
                Part::ToolCall(call) => merge_tool_call(&mut merged.parts, call),
                other => merged.parts.push(other.clone()),
            }
        }

        merge_events_lenient(&mut merged.metadata, &incoming.metadata);
        merged
    }

    /// Final pass over an accumulated message.
    ///
    /// Merges adjacent text, drops empty text, finalises partial stubs and
    /// drops stubs that never received an id or a name. Consolidating an
    /// already-consolidated message returns it unchanged.
    pub fn consolidate(&self, message: Message) -> Message {
        let Message {
            role,
            parts,
            metadata,
        } = message;

        let mut consolidated = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Part::Text(text) => push_text(&mut consolidated, &text.text),
                Part::ToolCall(call) => {
                    if call.id.is_empty() || call.name.is_empty() {
                        log::warn!("dropping incomplete tool call stub {:?}", call.name);
                        continue;
                    }
                    consolidated.push(Part::ToolCall(finalize_call(call)));
                }
                other => consolidated.push(other),
            }
        }

        Message {
            role,
            parts: consolidated,
            metadata,
        }
    }
}

fn push_text(parts: &mut Vec<Part>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Part::Text(last)) = parts.last_mut() {
        last.text.push_str(text);
    } else {
        parts.push(Part::Text(TextPart::new(text)));
    }
}

fn merge_tool_call(parts: &mut Vec<Part>, call: &ToolCallPart) {
    let existing = parts.iter_mut().find_map(|p| match p {
        Part::ToolCall(existing) if existing.id == call.id && !call.id.is_empty() => Some(existing),
        _ => None,
    });

    match existing {
        Some(existing) if existing.is_partial() => {
            let mut replacement = call.clone();
            // later fragments may omit the name once it has been announced
            if replacement.name.is_empty() {
                replacement.name = existing.name.clone();
            }
            *existing = replacement;
        }
        Some(existing) => {
            log::warn!(
                "ignoring repeated tool call id {} for already complete call {}",
                call.id,
                existing.name
            );
        }
        None => parts.push(Part::ToolCall(call.clone())),
    }
}

fn finalize_call(mut call: ToolCallPart) -> ToolCallPart {
    let Some(raw) = call.partial_arguments.take() else {
        return call;
    };

    if raw.trim().is_empty() {
        call.arguments = Value::Object(Map::new());
        return call;
    }

    match serde_json::from_str::<Value>(&raw) {
        Ok(arguments) => call.arguments = arguments,
        Err(e) => {
            log::debug!("tool call {} has malformed arguments: {}", call.id, e);
            call.arguments = Value::Object(Map::new());
            call.argument_error = Some(format!("Failed to parse tool arguments: {}", e));
        }
    }
    call
}

/// Message metadata is free-form; only list-shaped values are treated as events
fn merge_events_lenient(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    if source.is_empty() {
        return;
    }
    let (events, plain): (Map<String, Value>, Map<String, Value>) = source
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .partition(|(_, v)| v.is_array());
    merge_events(target, &events);
    for (key, value) in plain {
        target.insert(key, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;
    use serde_json::json;

    fn fragment(parts: Vec<Part>) -> Message {
        Message::model_with_parts(parts)
    }

    fn accumulate_all(fragments: &[Message]) -> Message {
        let acc = MessageAccumulator::new();
        fragments
            .iter()
            .fold(Message::empty_model(), |prev, next| acc.accumulate(prev, next))
    }

    #[test]
    fn test_text_deltas_are_coalesced() {
        let msg = accumulate_all(&[
            Message::model("Hel"),
            Message::model("lo "),
            Message::model("world"),
        ]);
        assert_eq!(msg.parts, vec![Part::text("Hello world")]);
    }

    #[test]
    fn test_part_order_is_preserved() {
        let msg = accumulate_all(&[
            Message::model("Let me check. "),
            fragment(vec![Part::ToolCall(ToolCallPart::new("c1", "get_time", json!({})))]),
            Message::model("Done."),
        ]);
        assert_eq!(msg.parts.len(), 3);
        assert!(matches!(msg.parts[0], Part::Text(_)));
        assert!(matches!(msg.parts[1], Part::ToolCall(_)));
        assert_eq!(msg.parts[2].as_text(), Some("Done."));
    }

    #[test]
    fn test_partial_stub_is_replaced() {
        let msg = accumulate_all(&[
            fragment(vec![Part::ToolCall(ToolCallPart::partial("c1", "search", "{\"q"))]),
            fragment(vec![Part::ToolCall(ToolCallPart::partial("c1", "", "{\"q\":\"rust\"}"))]),
        ]);
        assert_eq!(msg.parts.len(), 1);
        let call = msg.parts[0].as_tool_call().unwrap();
        assert_eq!(call.name, "search");
        assert_eq!(call.partial_arguments.as_deref(), Some("{\"q\":\"rust\"}"));

        let consolidated = MessageAccumulator::new().consolidate(msg);
        let call = consolidated.parts[0].as_tool_call().unwrap();
        assert!(!call.is_partial());
        assert_eq!(call.arguments, json!({"q": "rust"}));
    }

    #[test]
    fn test_complete_call_is_not_replaced() {
        let msg = accumulate_all(&[
            fragment(vec![Part::ToolCall(ToolCallPart::new("c1", "a", json!({"x": 1})))]),
            fragment(vec![Part::ToolCall(ToolCallPart::new("c1", "b", json!({"x": 2})))]),
        ]);
        assert_eq!(msg.parts.len(), 1);
        assert_eq!(msg.parts[0].as_tool_call().unwrap().name, "a");
    }

    #[test]
    fn test_malformed_arguments_are_captured() {
        let msg = fragment(vec![Part::ToolCall(ToolCallPart::partial("c1", "search", "{\"q\":"))]);
        let consolidated = MessageAccumulator::new().consolidate(msg);
        let call = consolidated.parts[0].as_tool_call().unwrap();
        assert!(!call.is_partial());
        assert!(call.argument_error.as_deref().unwrap().contains("Failed to parse"));
    }

    #[test]
    fn test_empty_partial_arguments_become_empty_object() {
        let msg = fragment(vec![Part::ToolCall(ToolCallPart::partial("c1", "get_time", ""))]);
        let consolidated = MessageAccumulator::new().consolidate(msg);
        assert_eq!(consolidated.parts[0].as_tool_call().unwrap().arguments, json!({}));
    }

    #[test]
    fn test_consolidate_drops_empty_text_and_nameless_stubs() {
        let msg = Message::new(
            Role::Model,
            vec![
                Part::text(""),
                Part::text("a"),
                Part::ToolCall(ToolCallPart::partial("", "", "{")),
                Part::text("b"),
            ],
        );
        let consolidated = MessageAccumulator::new().consolidate(msg);
        assert_eq!(consolidated.parts, vec![Part::text("ab")]);
    }

    #[test]
    fn test_consolidate_is_idempotent() {
        let acc = MessageAccumulator::new();
        let msg = accumulate_all(&[
            Message::model("x"),
            fragment(vec![Part::ToolCall(ToolCallPart::partial("c1", "t", "{bad"))]),
            fragment(vec![Part::ToolCall(ToolCallPart::partial("c2", "t", "{\"a\":1}"))]),
            Message::model(""),
        ]);
        let once = acc.consolidate(msg);
        let twice = acc.consolidate(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_metadata_events_are_appended() {
        let acc = MessageAccumulator::new();
        let first = Message::model("a").with_metadata("search", json!([{"step": 1}]));
        let second = Message::model("b").with_metadata("search", json!([{"step": 2}]));
        let merged = acc.accumulate(acc.accumulate(Message::empty_model(), &first), &second);
        assert_eq!(merged.metadata["search"], json!([{"step": 1}, {"step": 2}]));
    }
}
