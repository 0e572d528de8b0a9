//! Conversation state for a single interactive session.
//!
//! A session holds the ordered turns of one conversation. It always starts
//! with exactly one system turn and is owned by its caller; there is no
//! process-wide session cache.
use crate::completion::{ChatMessage, Role};
use thiserror::Error;

/// Behavior instruction placed in the initial system turn.
pub const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant that gives clear and concise answers.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("invalid role '{0}' for a turn: a session has exactly one system turn")]
    InvalidRole(Role),
}

/// Ordered conversation turns, insertion order = chronological order.
#[derive(Debug, Clone)]
pub struct Session {
    system_prompt: String,
    turns: Vec<ChatMessage>,
}

impl Session {
    /// Create a session with the default system instruction.
    pub fn new() -> Self {
        Self::with_system_prompt(DEFAULT_SYSTEM_PROMPT)
    }

    /// Create a session whose single system turn carries `prompt`.
    pub fn with_system_prompt(prompt: &str) -> Self {
        Self {
            system_prompt: prompt.to_string(),
            turns: vec![ChatMessage::new(Role::System, prompt)],
        }
    }

    /// Append a user or assistant turn. The system turn is fixed at
    /// session start, so appending another one is an invariant violation.
    pub fn append(&mut self, role: Role, content: &str) -> Result<(), SessionError> {
        if role == Role::System {
            return Err(SessionError::InvalidRole(role));
        }
        self.turns.push(ChatMessage::new(role, content));
        Ok(())
    }

    /// Reset to the single initial system turn.
    pub fn clear(&mut self) {
        self.turns.truncate(1);
        self.turns[0] = ChatMessage::new(Role::System, self.system_prompt.as_str());
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }

    /// The last `n` non-system turns in append order, as a lazy,
    /// restartable iterator. Never mutates the session.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &ChatMessage> + Clone {
        let visible = self
            .turns
            .iter()
            .filter(|turn| turn.role != Role::System)
            .count();
        self.turns
            .iter()
            .filter(|turn| turn.role != Role::System)
            .skip(visible.saturating_sub(n))
    }

    pub fn last_assistant(&self) -> Option<&ChatMessage> {
        self.turns
            .iter()
            .rev()
            .find(|turn| turn.role == Role::Assistant)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
