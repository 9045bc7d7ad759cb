use async_trait::async_trait;

use roomly_types::api::{CreateConversationRequest, Page, PageQuery, SendMessageRequest};
use roomly_types::models::{Conversation, ConversationId, Message};

use crate::error::Result;

/// The backend chat surface as seen by this layer. Implementations decode
/// the response envelope and map failures onto `ChatError`; they never retry.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// `POST /chat/conversations`
    async fn create_conversation(&self, req: &CreateConversationRequest) -> Result<Conversation>;

    /// `GET /chat/conversations?page&limit`
    async fn list_conversations(&self, query: PageQuery) -> Result<Page<Conversation>>;

    /// `GET /chat/conversations/:id/messages?page&limit`
    async fn list_messages(
        &self,
        conversation: &ConversationId,
        query: PageQuery,
    ) -> Result<Page<Message>>;

    /// `POST /chat/conversations/:id/messages`
    async fn send_message(
        &self,
        conversation: &ConversationId,
        req: &SendMessageRequest,
    ) -> Result<Message>;

    /// `POST /chat/conversations/:id/read`
    async fn mark_read(&self, conversation: &ConversationId) -> Result<()>;

    /// `GET /chat/unread-count`
    async fn unread_count(&self) -> Result<u64>;
}
