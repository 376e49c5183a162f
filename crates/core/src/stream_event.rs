//! Stream callbacks as a channel of serialisable events.
//!
//! Transports that push frames to a client (a socket, a terminal) take
//! the callbacks of a streaming reply as an ordered event stream instead.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::message::MessageContent;
use crate::robot::StreamCallbacks;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RobotStreamEvent {
    Start,
    Chunk { text: String },
    Finished,
    FullMessage { content: MessageContent },
    Error { message: String },
}

impl RobotStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::FullMessage { .. } | Self::Error { .. })
    }

    /// Wrap the receiving end as a `Stream`.
    pub fn stream_of(
        rx: mpsc::UnboundedReceiver<RobotStreamEvent>,
    ) -> UnboundedReceiverStream<RobotStreamEvent> {
        UnboundedReceiverStream::new(rx)
    }
}

impl StreamCallbacks {
    /// Callbacks that forward every signal into `tx`.
    ///
    /// Sends are fire-and-forget: a dropped receiver silences the stream.
    pub fn channel(tx: mpsc::UnboundedSender<RobotStreamEvent>) -> Self {
        let start = tx.clone();
        let finished = tx.clone();
        let full = tx.clone();
        let error = tx.clone();
        StreamCallbacks::new(move |text| {
            let _ = tx.send(RobotStreamEvent::Chunk {
                text: text.to_string(),
            });
        })
        .with_stream_start(move || {
            let _ = start.send(RobotStreamEvent::Start);
        })
        .with_stream_finished(move || {
            let _ = finished.send(RobotStreamEvent::Finished);
        })
        .with_full_message(move |content| {
            let _ = full.send(RobotStreamEvent::FullMessage {
                content: content.clone(),
            });
        })
        .with_error(move |e| {
            let _ = error.send(RobotStreamEvent::Error {
                message: e.to_string(),
            });
        })
    }
}
