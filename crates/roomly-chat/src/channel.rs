use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use roomly_types::api::{Page, SendMessageRequest};
use roomly_types::models::{ConversationId, Message, MessageType, UserId};

use crate::cache::{ChatCache, PendingMessage, PendingStatus, sort_chronological};
use crate::directory::page_query;
use crate::error::{ChatError, Result};
use crate::transport::ChatTransport;

pub const DEFAULT_MESSAGE_LIMIT: u32 = 50;

/// A message about to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub content: String,
    pub message_type: MessageType,
    pub attachments: Vec<String>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            message_type: MessageType::Text,
            attachments: Vec::new(),
        }
    }

    pub fn attachments(attachments: Vec<String>) -> Self {
        Self {
            content: String::new(),
            message_type: MessageType::Attachment,
            attachments,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.content = caption.into();
        self
    }

    fn validate(&self) -> Result<()> {
        let blank = self.content.trim().is_empty();
        match self.message_type {
            MessageType::Text if blank => {
                Err(ChatError::validation("content", "message content is empty"))
            }
            MessageType::Attachment if blank && self.attachments.is_empty() => Err(
                ChatError::validation("attachments", "attachment message has no attachments"),
            ),
            _ => Ok(()),
        }
    }
}

/// Messages of the viewer's conversations: listing, sending, read receipts.
pub struct MessageChannel {
    transport: Arc<dyn ChatTransport>,
    cache: Arc<ChatCache>,
    viewer: UserId,
}

impl MessageChannel {
    pub fn new(transport: Arc<dyn ChatTransport>, cache: Arc<ChatCache>, viewer: UserId) -> Self {
        Self {
            transport,
            cache,
            viewer,
        }
    }

    /// One page of a conversation, oldest first within the page whatever
    /// order the backend used. Read state is merged with what this client
    /// already knows, so a page fetched before a `mark_as_read` cannot undo it.
    pub async fn list_messages(
        &self,
        conversation: &ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<Vec<Message>> {
        Ok(self.list_messages_page(conversation, page, limit).await?.items)
    }

    /// Like [`list_messages`](Self::list_messages), keeping the backend's
    /// cursor so callers can walk pages with [`Pagination::has_next`].
    ///
    /// [`Pagination::has_next`]: roomly_types::api::Pagination::has_next
    pub async fn list_messages_page(
        &self,
        conversation: &ConversationId,
        page: u32,
        limit: u32,
    ) -> Result<Page<Message>> {
        let query = page_query(page, limit)?;
        let fetched = self.transport.list_messages(conversation, query).await?;
        debug!(
            "Fetched {} messages for {} (page {}/{})",
            fetched.items.len(),
            conversation,
            fetched.pagination.page,
            fetched.pagination.total_pages
        );

        let mut items = self.cache.merge_messages(conversation, fetched.items);
        sort_chronological(&mut items);
        Ok(Page {
            items,
            pagination: fetched.pagination,
        })
    }

    /// Every page of a conversation, oldest first.
    pub async fn list_all_messages(
        &self,
        conversation: &ConversationId,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let mut page = 1;
        loop {
            let fetched = self.list_messages_page(conversation, page, limit).await?;
            if !fetched.pagination.has_next() {
                break;
            }
            page += 1;
        }
        Ok(self.cache.messages(conversation))
    }

    /// Latest page with the default size.
    pub async fn recent_messages(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        self.list_messages(conversation, 1, DEFAULT_MESSAGE_LIMIT).await
    }

    /// Send a message and return it as the backend stored it. While the
    /// request is in flight the message is visible through
    /// [`pending_messages`](Self::pending_messages); on failure it stays there
    /// marked failed.
    pub async fn send_message(
        &self,
        conversation: &ConversationId,
        outgoing: OutgoingMessage,
    ) -> Result<Message> {
        outgoing.validate()?;

        let reference = Uuid::new_v4();
        self.cache.push_pending(PendingMessage {
            reference,
            conversation_id: conversation.clone(),
            content: outgoing.content.clone(),
            message_type: outgoing.message_type,
            attachments: outgoing.attachments.clone(),
            queued_at: Utc::now(),
            status: PendingStatus::Sending,
        });
        let mut guard = PendingGuard {
            cache: &self.cache,
            conversation,
            reference,
            settled: false,
        };

        let req = SendMessageRequest {
            content: outgoing.content,
            message_type: outgoing.message_type,
            attachments: outgoing.attachments,
        };

        let result = self.transport.send_message(conversation, &req).await;
        guard.settled = true;
        match result {
            Ok(message) => {
                info!("Sent message {} to {}", message.id, conversation);
                self.cache.resolve_pending(reference, &message);
                Ok(message)
            }
            Err(e) => {
                warn!("Send to {} failed: {}", conversation, e);
                self.cache.fail_pending(conversation, reference, e.to_string());
                Err(e)
            }
        }
    }

    pub async fn send_text(
        &self,
        conversation: &ConversationId,
        content: impl Into<String>,
    ) -> Result<Message> {
        self.send_message(conversation, OutgoingMessage::text(content)).await
    }

    /// Mark every message the viewer received in `conversation` as read.
    /// Safe to repeat.
    pub async fn mark_as_read(&self, conversation: &ConversationId) -> Result<()> {
        self.transport.mark_read(conversation).await?;
        self.cache.mark_read_locally(conversation, &self.viewer, Utc::now());
        debug!("Marked {} read", conversation);
        Ok(())
    }

    /// Unread messages across all of the viewer's conversations.
    pub async fn get_unread_count(&self) -> Result<u64> {
        let count = self.transport.unread_count().await?;
        self.cache.store_unread_total(count);
        Ok(count)
    }

    /// Badge probe: a failure is logged and reported as unknown.
    pub async fn unread_count_best_effort(&self) -> Option<u64> {
        match self.get_unread_count().await {
            Ok(count) => Some(count),
            Err(e) => {
                warn!("Unread count unavailable: {}", e);
                None
            }
        }
    }

    /// Cached unread total, if it is recent enough to show without a fetch.
    pub fn cached_unread_count(&self) -> Option<u64> {
        self.cache.unread_total()
    }

    pub fn pending_messages(&self, conversation: &ConversationId) -> Vec<PendingMessage> {
        self.cache.pending(conversation)
    }

    /// Forget a failed send. Returns whether it was still queued.
    pub fn discard_pending(&self, reference: Uuid) -> bool {
        self.cache.discard_pending(reference)
    }

    /// Whether the cached messages of `conversation` are recent enough to
    /// render without a refetch.
    pub fn is_fresh(&self, conversation: &ConversationId) -> bool {
        self.cache.messages_are_fresh(conversation)
    }

    /// Every cached message of a conversation, oldest first.
    pub fn cached_messages(&self, conversation: &ConversationId) -> Vec<Message> {
        self.cache.messages(conversation)
    }
}

/// Marks a pending send failed if its future is dropped before the
/// transport answers.
struct PendingGuard<'a> {
    cache: &'a ChatCache,
    conversation: &'a ConversationId,
    reference: Uuid,
    settled: bool,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!("Send {} to {} abandoned", self.reference, self.conversation);
            self.cache
                .fail_pending(self.conversation, self.reference, ABANDONED.to_string());
        }
    }
}

const ABANDONED: &str = "send abandoned before the server answered";
