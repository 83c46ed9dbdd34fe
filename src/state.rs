//! Mutable state owned by one in-flight call.
//!
//! A fresh [`StreamingState`] is built for every `send`/`send_stream` and
//! dropped when the stream ends. It is never shared: exactly one orchestrator
//! step holds `&mut` to it at a time.

use crate::metadata::merge_events;
use crate::tools::ToolRegistry;
use crate::types::{Message, Usage};
use crate::{Error, Result};
use serde_json::{Map, Value};

/// Where the turn loop currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// About to issue (or issuing) a model request
    Requesting,
    /// Draining the adapter stream into the in-progress message
    Accumulating,
    /// Turn ended; deciding between executing tools and finishing
    CheckingToolCalls,
    /// A tool batch is running
    ExecutingTools,
    /// No further requests will be made
    Done,
}

/// Conversation state for a single call
#[derive(Debug)]
pub struct StreamingState {
    history: Vec<Message>,
    registry: ToolRegistry,
    current: Message,
    turn_text: String,
    suppressed_text: String,
    metadata: Map<String, Value>,
    usage: Usage,
    phase: Phase,
    iterations: usize,
    max_iterations: usize,
}

impl StreamingState {
    pub fn new(history: Vec<Message>, registry: ToolRegistry, max_iterations: usize) -> Self {
        Self {
            history,
            registry,
            current: Message::empty_model(),
            turn_text: String::new(),
            suppressed_text: String::new(),
            metadata: Map::new(),
            usage: Usage::default(),
            phase: Phase::Requesting,
            iterations: 0,
            max_iterations,
        }
    }

    /// Conversation so far, including everything appended during this call
    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ToolRegistry {
        &mut self.registry
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        self.phase = phase;
    }

    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    pub fn finish(&mut self) {
        self.phase = Phase::Done;
    }

    /// Model requests issued so far
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Counts a new model request against the ceiling.
    ///
    /// Only called when the loop still has tool results to report back, so
    /// hitting the ceiling here always means work was left pending.
    pub fn begin_request(&mut self) -> Result<()> {
        if self.iterations >= self.max_iterations {
            log::warn!(
                "iteration ceiling of {} reached with tool calls pending",
                self.max_iterations
            );
            return Err(Error::IterationLimit {
                max: self.max_iterations,
            });
        }
        self.start_request();
        Ok(())
    }

    /// Counts a request that is exempt from the ceiling.
    ///
    /// Used for the closing schema request of the double-agent protocol,
    /// which never leaves tool calls pending.
    pub fn begin_closing_request(&mut self) {
        self.start_request();
    }

    fn start_request(&mut self) {
        self.iterations += 1;
        self.phase = Phase::Requesting;
        self.current = Message::empty_model();
        self.turn_text.clear();
    }

    /// The in-progress model message
    pub fn current(&self) -> &Message {
        &self.current
    }

    pub(crate) fn current_mut(&mut self) -> &mut Message {
        &mut self.current
    }

    /// Takes the in-progress message, leaving an empty one behind
    pub fn take_current(&mut self) -> Message {
        std::mem::replace(&mut self.current, Message::empty_model())
    }

    /// Text streamed during the current turn
    pub fn turn_text(&self) -> &str {
        &self.turn_text
    }

    pub(crate) fn push_turn_text(&mut self, text: &str) {
        self.turn_text.push_str(text);
    }

    pub fn take_turn_text(&mut self) -> String {
        std::mem::take(&mut self.turn_text)
    }

    /// Model prose withheld from the caller
    pub fn suppressed_text(&self) -> &str {
        &self.suppressed_text
    }

    pub fn suppress(&mut self, text: &str) {
        self.suppressed_text.push_str(text);
    }

    /// Appends a complete message to the conversation
    pub fn append(&mut self, message: Message) {
        self.history.push(message);
    }

    /// Tool-progress metadata gathered over every turn of this call
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn merge_metadata(&mut self, events: &Map<String, Value>) {
        merge_events(&mut self.metadata, events);
    }

    /// Usage summed over every request of this call
    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn add_usage(&mut self, usage: &Usage) {
        self.usage.add(usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state(max: usize) -> StreamingState {
        StreamingState::new(vec![Message::user("hi")], ToolRegistry::new(), max)
    }

    #[test]
    fn test_ceiling_is_enforced() {
        let mut state = state(2);
        assert!(state.begin_request().is_ok());
        assert!(state.begin_request().is_ok());
        let err = state.begin_request().unwrap_err();
        assert!(matches!(err, Error::IterationLimit { max: 2 }));
        assert_eq!(state.iterations(), 2);
    }

    #[test]
    fn test_closing_request_skips_ceiling() {
        let mut state = state(1);
        state.begin_request().unwrap();
        state.begin_closing_request();
        assert_eq!(state.iterations(), 2);
    }

    #[test]
    fn test_begin_request_resets_turn() {
        let mut state = state(3);
        state.begin_request().unwrap();
        state.push_turn_text("abc");
        state.current_mut().parts.push(crate::types::Part::text("abc"));
        state.begin_request().unwrap();
        assert!(state.turn_text().is_empty());
        assert!(state.current().parts.is_empty());
        assert_eq!(state.phase(), Phase::Requesting);
    }

    #[test]
    fn test_metadata_and_usage_accumulate() {
        let mut state = state(1);
        let mut events = Map::new();
        events.insert("search".into(), json!([{"q": "a"}]));
        state.merge_metadata(&events);
        state.merge_metadata(&events);
        assert_eq!(state.metadata()["search"].as_array().unwrap().len(), 2);

        state.add_usage(&Usage::new(Some(3), Some(4)));
        state.add_usage(&Usage::new(Some(1), None));
        assert_eq!(state.usage(), Usage::new(Some(4), Some(4)));
    }

    #[test]
    fn test_finish() {
        let mut state = state(1);
        assert!(!state.is_done());
        state.finish();
        assert!(state.is_done());
    }
}
