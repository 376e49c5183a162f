//! The conversation store seam.
//!
//! Persistence is owned by an external store. The orchestration core only
//! reads recent history and asks the store to create reply messages.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Result, StoreError};
use crate::message::{ConversationId, ConversationMessage, NewMessage};
use crate::robot::HistorySource;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    fn name(&self) -> &str;

    /// The most recent `limit` messages of a conversation, oldest first.
    async fn get_last_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> std::result::Result<Vec<ConversationMessage>, StoreError>;

    /// Persist a new message and return it with its assigned id.
    async fn create_message(
        &self,
        dto: NewMessage,
    ) -> std::result::Result<ConversationMessage, StoreError>;
}

/// History read from a [`ConversationStore`] when a call starts.
pub struct StoreHistory {
    store: Arc<dyn ConversationStore>,
    conversation_id: ConversationId,
    limit: usize,
    /// The message being answered, which the store may already hold.
    exclude_id: Option<String>,
}

impl StoreHistory {
    pub fn new(store: Arc<dyn ConversationStore>, conversation_id: ConversationId, limit: usize) -> Self {
        Self {
            store,
            conversation_id,
            limit,
            exclude_id: None,
        }
    }

    pub fn excluding(mut self, message_id: impl Into<String>) -> Self {
        self.exclude_id = Some(message_id.into());
        self
    }
}

#[async_trait]
impl HistorySource for StoreHistory {
    async fn load(&self) -> Result<Vec<ConversationMessage>> {
        let mut messages = self
            .store
            .get_last_messages(&self.conversation_id, self.limit)
            .await?;
        if let Some(id) = &self.exclude_id {
            messages.retain(|m| &m.id != id);
        }
        Ok(messages)
    }
}
