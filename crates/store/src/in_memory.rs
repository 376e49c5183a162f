//! In-memory conversation store: useful for testing and ephemeral sessions.

use std::collections::HashMap;

use async_trait::async_trait;
use botrelay_core::error::StoreError;
use botrelay_core::message::{ConversationId, ConversationMessage, NewMessage};
use botrelay_core::store::ConversationStore;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::trace;
use uuid::Uuid;

/// Messages kept per conversation, in insertion order.
pub struct InMemoryConversationStore {
    conversations: RwLock<HashMap<ConversationId, Vec<ConversationMessage>>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
        }
    }

    /// Record an already-built message, such as an inbound customer turn.
    pub async fn append(&self, message: ConversationMessage) {
        self.conversations
            .write()
            .await
            .entry(message.conversation_id.clone())
            .or_default()
            .push(message);
    }

    /// Every message of a conversation, oldest first.
    pub async fn all(&self, conversation_id: &ConversationId) -> Vec<ConversationMessage> {
        self.conversations
            .read()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.conversations.read().await.len()
    }
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn get_last_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, StoreError> {
        let conversations = self.conversations.read().await;
        let messages = conversations
            .get(conversation_id)
            .map(|all| all[all.len().saturating_sub(limit)..].to_vec())
            .unwrap_or_default();
        Ok(messages)
    }

    async fn create_message(&self, dto: NewMessage) -> Result<ConversationMessage, StoreError> {
        let now = Utc::now();
        let message = ConversationMessage {
            id: Uuid::new_v4().to_string(),
            conversation_id: dto.conversation_id,
            from_role: dto.from_role,
            to_role: dto.to_role,
            message_type: dto.message_type,
            content: dto.content,
            created_at: now,
            updated_at: now,
        };
        trace!(conversation_id = %message.conversation_id, id = %message.id, "Stored message");
        self.append(message.clone()).await;
        Ok(message)
    }
}
