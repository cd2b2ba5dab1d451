//! Token-bounded conversation memory
//!
//! The memory is keyed to a [`ChatModel`]: its capacity is the model's
//! context window and token counts come from the model's provider.

use crate::message::{Message, Role};
use crate::provider::ChatModel;

/// Conversation history that never grows past the model's context window.
///
/// When over budget the oldest non-system messages are evicted first; the
/// newest message is always kept.
#[derive(Clone, Debug)]
pub struct TokenMemory {
    model: ChatModel,
    messages: Vec<Message>,
    max_tokens: u32,
}

impl TokenMemory {
    pub fn new(model: ChatModel) -> Self {
        let max_tokens = model.context_window();
        Self::with_capacity(model, max_tokens)
    }

    /// Memory with an explicit token budget
    pub const fn with_capacity(model: ChatModel, max_tokens: u32) -> Self {
        Self {
            model,
            messages: Vec::new(),
            max_tokens,
        }
    }

    /// Add a message
    pub fn add(&mut self, message: Message) {
        self.messages.push(message);
        self.truncate_to_fit();
    }

    /// Add messages in order
    pub fn add_many(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.add(message);
        }
    }

    /// Get all messages
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Get the last message
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Forget everything
    pub fn reset(&mut self) {
        self.messages.clear();
    }

    pub const fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    /// Estimate total tokens held
    pub fn estimate_tokens(&self) -> u32 {
        self.messages
            .iter()
            .map(|m| self.model.estimate_message_tokens(m))
            .sum()
    }

    /// Number of messages
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn truncate_to_fit(&mut self) {
        while self.estimate_tokens() > self.max_tokens && self.messages.len() > 1 {
            // Find first non-system message and remove it
            match self.messages.iter().position(|m| m.role != Role::System) {
                // Don't remove the very last message
                Some(pos) if pos < self.messages.len() - 1 => {
                    let evicted = self.messages.remove(pos);
                    tracing::debug!(role = %evicted.role, "Evicted message from token memory");
                }
                _ => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scripted_model;

    #[test]
    fn test_add_many_preserves_order() {
        let mut memory = TokenMemory::new(scripted_model(Vec::<String>::new()));
        memory.add_many([Message::user("What is ACP?"), Message::assistant("A protocol.")]);

        assert_eq!(memory.len(), 2);
        assert_eq!(memory.messages()[0].role, Role::User);
        assert_eq!(memory.last().unwrap().content, "A protocol.");
    }

    #[test]
    fn test_evicts_oldest_non_system_messages() {
        // Each 40-char message is ~10 + 4 tokens under the default estimator
        let mut memory = TokenMemory::with_capacity(scripted_model(Vec::<String>::new()), 30);
        memory.add(Message::system("s"));
        memory.add(Message::user("a".repeat(40)));
        memory.add(Message::user("b".repeat(40)));

        assert!(memory.estimate_tokens() <= 30);
        assert_eq!(memory.messages()[0].role, Role::System);
        assert!(memory.last().unwrap().content.starts_with('b'));
        assert!(!memory.messages().iter().any(|m| m.content.starts_with('a')));
    }

    #[test]
    fn test_keeps_newest_message_even_if_oversized() {
        let mut memory = TokenMemory::with_capacity(scripted_model(Vec::<String>::new()), 5);
        memory.add(Message::user("x".repeat(400)));

        assert_eq!(memory.len(), 1);

        memory.reset();
        assert!(memory.is_empty());
    }
}
