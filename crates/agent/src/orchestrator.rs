//! Message orchestration: store → router → robot → store.
//!
//! The orchestrator takes an inbound request envelope, snapshots history
//! from the conversation store, lets the router pick a robot and a mode,
//! runs that mode, and persists every reply part through the store. It is
//! transport-agnostic: callers get envelopes and channels back.

use std::sync::Arc;

use async_trait::async_trait;
use botrelay_core::error::{Error, Result};
use botrelay_core::event::{DomainEvent, EventBus};
use botrelay_core::message::{
    ConversationMessage, EnvelopeKind, MessageContent, MessageEnvelope, NewMessage,
};
use botrelay_core::robot::{DelayedCallback, HistorySource, ResponseMode, Robot, StreamCallbacks};
use botrelay_core::store::{ConversationStore, StoreHistory};
use botrelay_core::stream_event::RobotStreamEvent;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::router::{Router, RoutingDecision};

/// The result of handling one inbound message.
pub struct Dispatched {
    /// The persisted immediate reply.
    pub response: MessageEnvelope,
    pub robot: String,
    pub mode: ResponseMode,
    pub rule: String,
    /// Delayed parts of a multi-part reply, each already persisted. Closes
    /// once the robot has nothing more to send.
    pub delayed: Option<mpsc::UnboundedReceiver<ConversationMessage>>,
}

pub struct MessageOrchestrator {
    router: Router,
    store: Arc<dyn ConversationStore>,
    history_limit: usize,
    events: Arc<EventBus>,
}

impl MessageOrchestrator {
    pub fn new(router: Router, store: Arc<dyn ConversationStore>, events: Arc<EventBus>) -> Self {
        Self {
            router,
            store,
            history_limit: 20,
            events,
        }
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    /// Route and answer a request envelope.
    pub async fn handle(&self, envelope: MessageEnvelope) -> Result<Dispatched> {
        let message = Self::unwrap_request(envelope)?;
        let decision = self.router.route(&message);
        self.dispatch(message, decision, None).await
    }

    /// Route a message, optionally forcing the robot or the mode.
    pub fn decide(
        &self,
        message: &ConversationMessage,
        robot: Option<&str>,
        mode: Option<ResponseMode>,
    ) -> Result<RoutingDecision> {
        let mut decision = match robot {
            Some(name) => self
                .router
                .direct(name, mode.unwrap_or(ResponseMode::Immediate))?,
            None => self.router.route(message),
        };
        if let Some(mode) = mode {
            decision.mode = mode;
        }
        Ok(decision)
    }

    /// Run `decision` for `message` and persist the reply.
    ///
    /// In streaming mode every callback is also forwarded to `sink`.
    pub async fn dispatch(
        &self,
        message: ConversationMessage,
        decision: RoutingDecision,
        sink: Option<mpsc::UnboundedSender<RobotStreamEvent>>,
    ) -> Result<Dispatched> {
        let robot_name = decision.robot_name().to_string();
        info!(
            conversation_id = %message.conversation_id,
            robot = %robot_name,
            mode = %decision.mode,
            rule = %decision.rule,
            "Dispatching message"
        );
        self.events.publish(DomainEvent::MessageRouted {
            conversation_id: message.conversation_id.to_string(),
            robot: robot_name.clone(),
            mode: decision.mode,
            rule: decision.rule.clone(),
            timestamp: Utc::now(),
        });

        let history: Arc<dyn HistorySource> = Arc::new(
            StoreHistory::new(
                Arc::clone(&self.store),
                message.conversation_id.clone(),
                self.history_limit,
            )
            .excluding(message.id.clone()),
        );

        let mut delayed = None;
        let content = match decision.mode {
            ResponseMode::Immediate => {
                decision
                    .robot
                    .accept_message_immediate_response(&message, Some(history.as_ref()))
                    .await
            }
            ResponseMode::Streaming => {
                stream_reply(decision.robot.as_ref(), &message, history.as_ref(), sink).await
            }
            ResponseMode::MultiPart => {
                let (tx, rx) = mpsc::unbounded_channel();
                let parts = Arc::new(PersistingCallback {
                    store: Arc::clone(&self.store),
                    reply_to: message.clone(),
                    robot: robot_name.clone(),
                    persisted: tx,
                });
                delayed = Some(rx);
                Arc::clone(&decision.robot)
                    .accept_message_multi_part_response(message.clone(), parts, Some(history))
                    .await
            }
        };

        let reply = self
            .store
            .create_message(NewMessage::robot_reply(&message, content))
            .await?;

        Ok(Dispatched {
            response: MessageEnvelope::response(reply),
            robot: robot_name,
            mode: decision.mode,
            rule: decision.rule,
            delayed,
        })
    }

    fn unwrap_request(envelope: MessageEnvelope) -> Result<ConversationMessage> {
        match envelope.request_or_response {
            EnvelopeKind::Request => Ok(envelope.envelope_payload),
            EnvelopeKind::Response => Err(Error::InvalidEnvelope(format!(
                "message {} is a response, expected a request",
                envelope.message_id
            ))),
        }
    }
}

/// Drive a streaming reply, forwarding events to `sink` as they happen.
///
/// Returns the full message, or error content if the stream failed.
async fn stream_reply(
    robot: &dyn Robot,
    message: &ConversationMessage,
    history: &dyn HistorySource,
    sink: Option<mpsc::UnboundedSender<RobotStreamEvent>>,
) -> MessageContent {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let forwarder = tokio::spawn(async move {
        let mut terminal = None;
        while let Some(event) = rx.recv().await {
            match &event {
                RobotStreamEvent::FullMessage { content } => terminal = Some(content.clone()),
                RobotStreamEvent::Error { message } => {
                    terminal = Some(MessageContent::error(message));
                }
                _ => {}
            }
            if let Some(sink) = &sink {
                let _ = sink.send(event);
            }
        }
        terminal
    });

    {
        let callbacks = StreamCallbacks::channel(tx);
        robot
            .accept_message_stream_response(message, &callbacks, Some(history))
            .await;
    }

    match forwarder.await {
        Ok(Some(content)) => content,
        Ok(None) => MessageContent::text(botrelay_core::robot::NO_RESPONSE),
        Err(e) => {
            warn!(robot = %robot.name(), error = %e, "Stream forwarder stopped");
            MessageContent::error(&e)
        }
    }
}

/// Persists each delayed part and hands the stored message on.
struct PersistingCallback {
    store: Arc<dyn ConversationStore>,
    reply_to: ConversationMessage,
    robot: String,
    persisted: mpsc::UnboundedSender<ConversationMessage>,
}

#[async_trait]
impl DelayedCallback for PersistingCallback {
    async fn deliver(&self, content: MessageContent) {
        let dto = NewMessage::robot_reply(&self.reply_to, content);
        match self.store.create_message(dto).await {
            Ok(stored) => {
                info!(
                    conversation_id = %stored.conversation_id,
                    robot = %self.robot,
                    "Persisted delayed part"
                );
                let _ = self.persisted.send(stored);
            }
            Err(e) => {
                warn!(robot = %self.robot, error = %e, "Failed to persist delayed part");
            }
        }
    }
}
