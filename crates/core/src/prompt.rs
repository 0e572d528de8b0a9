//! Prompt composition for the two request flows.
//!
//! Both composers are pure, order-preserving transforms: no reordering,
//! no deduplication, no truncation.
use crate::completion::{ChatMessage, Role};
use crate::session::Session;

/// Fixed instruction for the one-shot question flow. No history is
/// retained across calls on this path.
pub const QUESTION_SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Please respond to the question asked";

/// Every turn of the session, in order, becomes one message.
pub fn compose_session(session: &Session) -> Vec<ChatMessage> {
    session.turns().to_vec()
}

/// The fixed instruction followed by the question verbatim.
pub fn compose_question(question: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::new(Role::System, QUESTION_SYSTEM_PROMPT),
        ChatMessage::new(Role::User, question),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_question_is_exactly_two_messages() {
        let messages = compose_question("What is the capital of France?");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, QUESTION_SYSTEM_PROMPT);
        assert_eq!(messages[1].role, Role::User);
        assert_eq!(messages[1].content, "What is the capital of France?");
    }

    #[test]
    fn test_compose_session_preserves_every_turn_in_order() {
        let mut session = Session::new();
        session.append(Role::User, "q1").unwrap();
        session.append(Role::Assistant, "a1").unwrap();
        session.append(Role::User, "q1").unwrap(); // duplicates are kept

        let messages = compose_session(&session);
        assert_eq!(messages.len(), session.turns().len());
        assert_eq!(messages, session.turns().to_vec());
    }
}
