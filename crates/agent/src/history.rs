//! Conversation history adapter.
//!
//! Stored messages carry three participant roles; providers want two.
//! Customers and human agents become `user`, robots become `assistant`,
//! and the message being answered always goes last as `user`.
//!
//! Robot messages that are raw structured output or that record tool
//! execution are dropped first, so the provider sees conversation rather
//! than internal tool chatter.

use botrelay_core::message::{ConversationMessage, MessageContent, Participant};
use botrelay_core::provider::Turn;

/// Prefix of a tool outcome line written by the tool-call loop.
pub const TOOL_RESULT_MARKER: &str = "[tool ";

/// Prefix of a failed tool outcome written by the tool-call loop.
pub const TOOL_ERROR_MARKER: &str = "Error executing ";

const TOOL_MARKERS: [&str; 2] = [TOOL_RESULT_MARKER, TOOL_ERROR_MARKER];

/// Whether a stored message belongs in provider context.
pub fn is_relevant(message: &ConversationMessage) -> bool {
    if message.from_role != Participant::Robot {
        return true;
    }
    match &message.content {
        MessageContent::Text(text) => {
            !text.trim_start().starts_with('{') && !TOOL_MARKERS.iter().any(|m| text.contains(m))
        }
        MessageContent::Json(_) => false,
    }
}

/// Text a provider sees for a stored message.
fn turn_text(content: &MessageContent) -> String {
    match content {
        MessageContent::Text(text) => text.clone(),
        MessageContent::Json(value) => value.to_string(),
    }
}

/// Adapt stored history plus the current message into provider turns.
///
/// If `history` already holds `current` (same id) it is not repeated.
pub fn adapt(history: &[ConversationMessage], current: &ConversationMessage) -> Vec<Turn> {
    let mut turns: Vec<Turn> = history
        .iter()
        .filter(|m| m.id != current.id)
        .filter(|m| is_relevant(m))
        .map(|m| match m.from_role {
            Participant::Customer | Participant::Agent => Turn::user(turn_text(&m.content)),
            Participant::Robot => Turn::assistant(turn_text(&m.content)),
        })
        .collect();

    turns.push(Turn::user(turn_text(&current.content)));
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use botrelay_core::message::ConversationId;
    use botrelay_core::provider::TurnRole;

    fn conv() -> ConversationId {
        ConversationId::from("c-1")
    }

    fn from(role: Participant, text: &str) -> ConversationMessage {
        ConversationMessage::new(conv(), role, Participant::Robot, MessageContent::text(text))
    }

    #[test]
    fn roles_collapse_to_two_parties() {
        let history = vec![
            from(Participant::Customer, "hi"),
            from(Participant::Robot, "hello!"),
            from(Participant::Agent, "a human here"),
        ];
        let current = ConversationMessage::customer(conv(), "what now?");
        let turns = adapt(&history, &current);

        let roles: Vec<TurnRole> = turns.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![TurnRole::User, TurnRole::Assistant, TurnRole::User, TurnRole::User]
        );
        assert_eq!(turns.last().unwrap().content, "what now?");
    }

    #[test]
    fn tool_output_is_filtered_but_customers_are_kept() {
        let history = vec![
            from(Participant::Robot, r#"{"tool":"x"} and more"#),
            from(Participant::Customer, r#"{"tool":"x"} and more"#),
            from(Participant::Robot, "Checking.\n[tool get_form] {...}\nDone."),
            from(Participant::Robot, "Error executing get_form: boom"),
            from(Participant::Robot, "A normal answer"),
        ];
        let current = ConversationMessage::customer(conv(), "thanks");
        let turns = adapt(&history, &current);

        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(
            contents,
            vec![r#"{"tool":"x"} and more"#, "A normal answer", "thanks"]
        );
        assert_eq!(turns[0].role, TurnRole::User);
    }

    #[test]
    fn robot_json_content_is_dropped() {
        let json = ConversationMessage::new(
            conv(),
            Participant::Robot,
            Participant::Customer,
            MessageContent::Json(serde_json::json!({"card": 1})),
        );
        assert!(!is_relevant(&json));
    }

    #[test]
    fn current_message_is_not_duplicated() {
        let current = ConversationMessage::customer(conv(), "once");
        let turns = adapt(&[current.clone()], &current);
        assert_eq!(turns.len(), 1);
    }

    #[test]
    fn empty_history_yields_only_current() {
        let current = ConversationMessage::customer(conv(), "hello");
        let turns = adapt(&[], &current);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, TurnRole::User);
    }
}
