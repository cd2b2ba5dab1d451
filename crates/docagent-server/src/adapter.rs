//! Message adapter
//!
//! Translates ACP messages into the agent runtime's messages.

use docagent_core::{AgentError, Message, Result};

use crate::acp;

/// Map a `(role, content)` pair onto a runtime message.
///
/// Only `user` and `assistant` are representable.
pub fn to_framework_message(role: &str, content: impl Into<String>) -> Result<Message> {
    match role {
        "user" => Ok(Message::user(content)),
        "assistant" => Ok(Message::assistant(content)),
        other => Err(AgentError::UnsupportedRole(other.to_string())),
    }
}

/// Translate a whole request, keeping input order
pub fn framework_messages(input: &[acp::Message]) -> Result<Vec<Message>> {
    input
        .iter()
        .map(|m| to_framework_message(m.effective_role(), m.text_content()))
        .collect()
}
