//! Conversation history rules enforced before any request is issued.
//!
//! A system message may only appear at index 0. After it, roles strictly
//! alternate `user, model, user, model, …` starting with `user`. Tool results
//! travel as `user` messages, so a tool round trip keeps the alternation.

use crate::types::{Message, Role};
use crate::{Error, Result};

/// Checks the alternation rule over the whole history.
pub fn validate_alternation(history: &[Message]) -> Result<()> {
    let mut expected = Role::User;

    for (index, message) in history.iter().enumerate() {
        match message.role {
            Role::System if index == 0 => continue,
            Role::System => {
                return Err(Error::alternation(
                    index,
                    "system message is only allowed at index 0",
                ));
            }
            role if role != expected => {
                return Err(Error::alternation(
                    index,
                    format!("expected a {:?} message, found {:?}", expected, role),
                ));
            }
            _ => {}
        }

        expected = match expected {
            Role::User => Role::Model,
            _ => Role::User,
        };
    }

    Ok(())
}

/// Builds the request history for one call: optional system prompt, the
/// caller's history, and the new user message.
///
/// The system prompt is only inserted when the caller's history does not
/// already open with a system message.
pub fn with_prompt(system_prompt: Option<&str>, history: &[Message], prompt: Message) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);

    let has_system = history.first().is_some_and(|m| m.role == Role::System);
    if let Some(system) = system_prompt.filter(|s| !s.is_empty()) {
        if !has_system {
            messages.push(Message::system(system));
        }
    }

    messages.extend_from_slice(history);
    messages.push(prompt);
    messages
}
