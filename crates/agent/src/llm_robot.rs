//! A robot backed by an LLM provider and a tool catalog.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use botrelay_core::error::{Error, Result};
use botrelay_core::event::{DomainEvent, EventBus};
use botrelay_core::message::{ConversationMessage, MessageContent};
use botrelay_core::provider::Turn;
use botrelay_core::robot::{
    DEFAULT_FOLLOW_UP_DELAY, HistorySource, NO_RESPONSE, Robot, StreamCallbacks,
};
use chrono::Utc;
use tracing::{info, warn};

use crate::history;
use crate::loop_runner::{Delivery, ToolLoop};

/// Answers through a [`ToolLoop`].
///
/// Holds no conversation state. History is loaded from the source passed
/// into each call.
pub struct LlmRobot {
    name: String,
    tool_loop: ToolLoop,
    follow_up_prompt: Option<String>,
    follow_up_delay: Duration,
    events: Option<Arc<EventBus>>,
}

impl LlmRobot {
    pub fn new(name: impl Into<String>, tool_loop: ToolLoop) -> Self {
        Self {
            name: name.into(),
            tool_loop,
            follow_up_prompt: None,
            follow_up_delay: DEFAULT_FOLLOW_UP_DELAY,
            events: None,
        }
    }

    /// Ask the provider for one supplementary part after each reply.
    pub fn with_follow_up_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.follow_up_prompt = Some(prompt.into());
        self
    }

    pub fn with_follow_up_delay(mut self, delay: Duration) -> Self {
        self.follow_up_delay = delay;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    async fn turns(
        &self,
        message: &ConversationMessage,
        history: Option<&dyn HistorySource>,
    ) -> Result<Vec<Turn>> {
        let stored = match history {
            Some(source) => source.load().await?,
            None => Vec::new(),
        };
        Ok(history::adapt(&stored, message))
    }

    /// Log and publish an error that is about to be folded into content.
    fn report(&self, context: &str, error: &Error) {
        warn!(robot = %self.name, error = %error, "{context}");
        if let Some(events) = &self.events {
            events.publish(DomainEvent::ErrorOccurred {
                context: format!("{}: {context}", self.name),
                error_message: error.to_string(),
                timestamp: Utc::now(),
            });
        }
    }
}

#[async_trait]
impl Robot for LlmRobot {
    fn name(&self) -> &str {
        &self.name
    }

    fn provider_name(&self) -> Option<&str> {
        Some(self.tool_loop.provider().name())
    }

    fn has_credential(&self) -> bool {
        self.tool_loop.provider().has_credential()
    }

    fn follow_up_delay(&self) -> Duration {
        self.follow_up_delay
    }

    async fn accept_message_stream_response(
        &self,
        message: &ConversationMessage,
        callbacks: &StreamCallbacks,
        history: Option<&dyn HistorySource>,
    ) {
        callbacks.start();

        let turns = match self.turns(message, history).await {
            Ok(turns) => turns,
            Err(e) => {
                self.report("History load failed", &e);
                callbacks.fail(&e);
                return;
            }
        };

        let emit = |text: &str| callbacks.chunk(text);
        match self.tool_loop.run(turns, Delivery::Stream, &emit).await {
            Ok(outcome) => {
                info!(
                    robot = %self.name,
                    rounds = outcome.rounds,
                    tool_calls = outcome.tool_calls,
                    "Streamed reply"
                );
                callbacks.finish(&MessageContent::text(outcome.text));
            }
            Err(e) => {
                self.report("Streaming reply failed", &e);
                callbacks.fail(&e);
            }
        }
    }

    async fn accept_message_immediate_response(
        &self,
        message: &ConversationMessage,
        history: Option<&dyn HistorySource>,
    ) -> MessageContent {
        let turns = match self.turns(message, history).await {
            Ok(turns) => turns,
            Err(e) => {
                self.report("History load failed", &e);
                return MessageContent::error(&e);
            }
        };

        match self.tool_loop.run(turns, Delivery::Complete, &|_| {}).await {
            Ok(outcome) => {
                info!(
                    robot = %self.name,
                    rounds = outcome.rounds,
                    tool_calls = outcome.tool_calls,
                    tokens = outcome.usage.total_tokens,
                    "Generated reply"
                );
                MessageContent::text(outcome.text)
            }
            Err(e) => {
                self.report("Reply failed", &e);
                MessageContent::error(&e)
            }
        }
    }

    async fn follow_ups(
        &self,
        message: &ConversationMessage,
        reply: &MessageContent,
        history: Option<&dyn HistorySource>,
    ) -> Result<Vec<MessageContent>> {
        let Some(prompt) = &self.follow_up_prompt else {
            return Ok(Vec::new());
        };

        let mut turns = self.turns(message, history).await?;
        let reply_text = match reply {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Json(value) => value.to_string(),
        };
        turns.push(Turn::assistant(reply_text));
        turns.push(Turn::user(prompt.clone()));

        let outcome = self.tool_loop.run(turns, Delivery::Complete, &|_| {}).await?;
        let text = outcome.text.trim();
        if text.is_empty() || text == NO_RESPONSE {
            return Ok(Vec::new());
        }
        Ok(vec![MessageContent::text(text)])
    }
}
