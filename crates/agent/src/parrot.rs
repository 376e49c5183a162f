//! The parrot: the fallback robot when no rule claims a message.
//!
//! Needs no provider and no credential. It repeats the text it was sent.

use async_trait::async_trait;
use botrelay_core::message::{ConversationMessage, MessageContent};
use botrelay_core::robot::{HistorySource, Robot, StreamCallbacks};

const NOT_TEXT: &str = "I can only repeat text messages.";

pub struct ParrotRobot {
    name: String,
}

impl ParrotRobot {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn echo(message: &ConversationMessage) -> &str {
        message.text().unwrap_or(NOT_TEXT)
    }
}

impl Default for ParrotRobot {
    fn default() -> Self {
        Self::new("parrot")
    }
}

#[async_trait]
impl Robot for ParrotRobot {
    fn name(&self) -> &str {
        &self.name
    }

    async fn accept_message_stream_response(
        &self,
        message: &ConversationMessage,
        callbacks: &StreamCallbacks,
        _history: Option<&dyn HistorySource>,
    ) {
        callbacks.start();
        let echo = Self::echo(message);
        for word in echo.split_inclusive(' ') {
            callbacks.chunk(word);
        }
        callbacks.finish(&MessageContent::text(echo));
    }

    async fn accept_message_immediate_response(
        &self,
        message: &ConversationMessage,
        _history: Option<&dyn HistorySource>,
    ) -> MessageContent {
        MessageContent::text(Self::echo(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use botrelay_core::message::{ConversationId, Participant};
    use std::sync::{Arc, Mutex};

    fn message(text: &str) -> ConversationMessage {
        ConversationMessage::customer(ConversationId::from("c-9"), text)
    }

    #[tokio::test]
    async fn immediate_echoes_text() {
        let reply = ParrotRobot::default()
            .accept_message_immediate_response(&message("hello there"), None)
            .await;
        assert_eq!(reply.as_text(), Some("hello there"));
    }

    #[tokio::test]
    async fn streams_word_by_word() {
        let chunks = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = chunks.clone();
        let full = Arc::new(Mutex::new(None::<MessageContent>));
        let full_sink = full.clone();
        let callbacks = StreamCallbacks::new(move |s| sink.lock().unwrap().push(s.into()))
            .with_full_message(move |m| *full_sink.lock().unwrap() = Some(m.clone()));

        ParrotRobot::default()
            .accept_message_stream_response(&message("one two three"), &callbacks, None)
            .await;

        assert_eq!(*chunks.lock().unwrap(), vec!["one ", "two ", "three"]);
        assert_eq!(
            full.lock().unwrap().as_ref().and_then(|m| m.as_text()),
            Some("one two three")
        );
    }

    #[tokio::test]
    async fn json_content_gets_a_fixed_reply() {
        let json = ConversationMessage::new(
            ConversationId::from("c-9"),
            Participant::Customer,
            Participant::Robot,
            MessageContent::Json(serde_json::json!({"a": 1})),
        );
        let reply = ParrotRobot::default()
            .accept_message_immediate_response(&json, None)
            .await;
        assert_eq!(reply.as_text(), Some(NOT_TEXT));
    }

    #[test]
    fn has_no_provider() {
        let parrot = ParrotRobot::default();
        assert_eq!(parrot.provider_name(), None);
        assert!(parrot.has_credential());
    }
}
