//! The Robot contract: what every conversational agent implements.
//!
//! A robot answers an inbound message in one of three modes:
//!
//! - **immediate**: one awaited reply, errors folded into the content
//! - **streaming**: results reported only through [`StreamCallbacks`]
//! - **multi-part**: an immediate reply plus supplementary parts delivered
//!   later through a [`DelayedCallback`]
//!
//! The default implementations compose: multi-part is built on immediate,
//! and immediate is built on streaming. History is always an explicit
//! per-call argument, never robot state, so one robot instance can serve
//! any number of concurrent turns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::message::{ConversationMessage, MessageContent};

/// Literal content returned when a provider produced nothing at all.
pub const NO_RESPONSE: &str = "No response generated.";

/// Default delay before each delayed part of a multi-part reply.
pub const DEFAULT_FOLLOW_UP_DELAY: Duration = Duration::from_millis(750);

/// How a reply is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Immediate,
    Streaming,
    MultiPart,
}

impl std::fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Immediate => "immediate",
            Self::Streaming => "streaming",
            Self::MultiPart => "multi_part",
        };
        f.write_str(name)
    }
}

/// Lazily supplies the stored history for a turn.
///
/// Loaded once at the start of a call. A concurrent call on the same
/// conversation may see a stale snapshot.
#[async_trait]
pub trait HistorySource: Send + Sync {
    async fn load(&self) -> Result<Vec<ConversationMessage>>;
}

#[async_trait]
impl HistorySource for Vec<ConversationMessage> {
    async fn load(&self) -> Result<Vec<ConversationMessage>> {
        Ok(self.clone())
    }
}

/// Receives the supplementary parts of a multi-part reply.
#[async_trait]
pub trait DelayedCallback: Send + Sync {
    async fn deliver(&self, content: MessageContent);
}

type SignalFn = Box<dyn Fn() + Send + Sync>;
type ChunkFn = Box<dyn Fn(&str) + Send + Sync>;
type ContentFn = Box<dyn Fn(&MessageContent) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&Error) + Send + Sync>;

/// The consumer side of a streaming reply.
///
/// Exactly one terminal signal is delivered per stream: either
/// finished (plus full message) or error. Anything emitted after the
/// terminal signal is dropped. When no error handler is installed, an
/// error is written to the chunk channel and the stream finishes with the
/// error text as its full message.
pub struct StreamCallbacks {
    on_stream_start: Option<SignalFn>,
    on_stream_chunk_received: ChunkFn,
    on_stream_finished: Option<SignalFn>,
    on_full_message_received: Option<ContentFn>,
    on_error: Option<ErrorFn>,
    terminated: AtomicBool,
}

impl StreamCallbacks {
    pub fn new(on_chunk: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            on_stream_start: None,
            on_stream_chunk_received: Box::new(on_chunk),
            on_stream_finished: None,
            on_full_message_received: None,
            on_error: None,
            terminated: AtomicBool::new(false),
        }
    }

    pub fn with_stream_start(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stream_start = Some(Box::new(f));
        self
    }

    pub fn with_stream_finished(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_stream_finished = Some(Box::new(f));
        self
    }

    pub fn with_full_message(
        mut self,
        f: impl Fn(&MessageContent) + Send + Sync + 'static,
    ) -> Self {
        self.on_full_message_received = Some(Box::new(f));
        self
    }

    pub fn with_error(mut self, f: impl Fn(&Error) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    pub fn has_error_handler(&self) -> bool {
        self.on_error.is_some()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn start(&self) {
        if let Some(f) = &self.on_stream_start {
            f();
        }
    }

    pub fn chunk(&self, text: &str) {
        if text.is_empty() || self.is_terminated() {
            return;
        }
        (self.on_stream_chunk_received)(text);
    }

    /// Deliver the finished signal and the full message.
    pub fn finish(&self, full: &MessageContent) {
        if !self.terminate() {
            return;
        }
        if let Some(f) = &self.on_stream_finished {
            f();
        }
        if let Some(f) = &self.on_full_message_received {
            f(full);
        }
    }

    /// Deliver an error, or fold it into the chunk channel.
    pub fn fail(&self, error: &Error) {
        match &self.on_error {
            Some(on_error) => {
                if self.terminate() {
                    on_error(error);
                }
            }
            None => {
                let content = MessageContent::error(error);
                if let Some(text) = content.as_text() {
                    self.chunk(text);
                }
                self.finish(&content);
            }
        }
    }

    /// Returns true for the first caller only.
    fn terminate(&self) -> bool {
        !self.terminated.swap(true, Ordering::SeqCst)
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The contract every robot implements.
#[async_trait]
pub trait Robot: Send + Sync + 'static {
    /// Registry name of this robot (e.g. "parrot").
    fn name(&self) -> &str;

    /// Name of the backing provider, if any.
    fn provider_name(&self) -> Option<&str> {
        None
    }

    /// Whether the provider credential was present at construction.
    fn has_credential(&self) -> bool {
        true
    }

    /// Delay before each delayed part of a multi-part reply.
    fn follow_up_delay(&self) -> Duration {
        DEFAULT_FOLLOW_UP_DELAY
    }

    /// Drive a reply and report it exclusively through `callbacks`.
    ///
    /// Returns once a terminal callback has fired. Internal failures must
    /// reach `callbacks.fail`.
    async fn accept_message_stream_response(
        &self,
        message: &ConversationMessage,
        callbacks: &StreamCallbacks,
        history: Option<&dyn HistorySource>,
    );

    /// One awaited reply. Never fails: errors become content.
    async fn accept_message_immediate_response(
        &self,
        message: &ConversationMessage,
        history: Option<&dyn HistorySource>,
    ) -> MessageContent {
        let full = Arc::new(Mutex::new(None::<MessageContent>));
        let failure = Arc::new(Mutex::new(None::<String>));
        let full_sink = Arc::clone(&full);
        let failure_sink = Arc::clone(&failure);

        let callbacks = StreamCallbacks::new(|_| {})
            .with_full_message(move |content| *lock(&full_sink) = Some(content.clone()))
            .with_error(move |e| *lock(&failure_sink) = Some(e.to_string()));

        self.accept_message_stream_response(message, &callbacks, history)
            .await;

        let failure = lock(&failure).take();
        if let Some(e) = failure {
            return MessageContent::error(&e);
        }
        let full = lock(&full).take();
        full.unwrap_or_else(|| MessageContent::text(NO_RESPONSE))
    }

    /// Supplementary parts for a multi-part reply. None by default.
    async fn follow_ups(
        &self,
        _message: &ConversationMessage,
        _reply: &MessageContent,
        _history: Option<&dyn HistorySource>,
    ) -> Result<Vec<MessageContent>> {
        Ok(Vec::new())
    }

    /// Immediate reply now, follow-up parts later through `delayed`.
    ///
    /// The immediate value is always returned. A failure on the delayed
    /// path is delivered as error content through `delayed`.
    ///
    /// History is loaded once, before the reply, and the same snapshot
    /// feeds the follow-ups. The reply itself is persisted by the caller
    /// meanwhile and must not show up in the follow-up history.
    async fn accept_message_multi_part_response(
        self: Arc<Self>,
        message: ConversationMessage,
        delayed: Arc<dyn DelayedCallback>,
        history: Option<Arc<dyn HistorySource>>,
    ) -> MessageContent {
        let snapshot = match history {
            Some(source) => match source.load().await {
                Ok(messages) => Some(messages),
                Err(e) => {
                    warn!(robot = %self.name(), error = %e, "Failed to load history");
                    return MessageContent::error(&e);
                }
            },
            None => None,
        };

        let reply = self
            .accept_message_immediate_response(
                &message,
                snapshot.as_ref().map(|m| m as &dyn HistorySource),
            )
            .await;

        let robot = Arc::clone(&self);
        let immediate = reply.clone();
        tokio::spawn(async move {
            let delay = robot.follow_up_delay();
            match robot
                .follow_ups(
                    &message,
                    &immediate,
                    snapshot.as_ref().map(|m| m as &dyn HistorySource),
                )
                .await
            {
                Ok(parts) => {
                    for part in parts {
                        tokio::time::sleep(delay).await;
                        delayed.deliver(part).await;
                    }
                }
                Err(e) => {
                    warn!(robot = %robot.name(), error = %e, "Follow-up failed");
                    tokio::time::sleep(delay).await;
                    delayed.deliver(MessageContent::error(&e)).await;
                }
            }
        });

        reply
    }
}
