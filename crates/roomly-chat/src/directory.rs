use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, warn};

use roomly_types::api::{CreateConversationRequest, Page, PageQuery};
use roomly_types::models::{Conversation, ListingId, UserId};

use crate::cache::{ChatCache, sort_by_activity};
use crate::error::{ChatError, Result};
use crate::transport::ChatTransport;

pub const DEFAULT_CONVERSATION_LIMIT: u32 = 20;

/// Upper bound on any page size sent to the backend.
pub const MAX_PAGE_LIMIT: u32 = 200;

/// Validate a 1-based page request. Oversized limits are clamped.
pub(crate) fn page_query(page: u32, limit: u32) -> Result<PageQuery> {
    if page == 0 {
        return Err(ChatError::validation("page", "page numbers start at 1"));
    }
    if limit == 0 {
        return Err(ChatError::validation("limit", "limit must be at least 1"));
    }
    Ok(PageQuery {
        page,
        limit: limit.min(MAX_PAGE_LIMIT),
    })
}

/// The signed-in user's conversations.
pub struct ConversationDirectory {
    transport: Arc<dyn ChatTransport>,
    cache: Arc<ChatCache>,
    viewer: UserId,
}

impl ConversationDirectory {
    pub fn new(transport: Arc<dyn ChatTransport>, cache: Arc<ChatCache>, viewer: UserId) -> Self {
        Self {
            transport,
            cache,
            viewer,
        }
    }

    /// Open the conversation with `counterpart`, optionally about a listing.
    /// The backend returns the existing conversation for a known pair.
    pub async fn create_or_get_conversation(
        &self,
        counterpart: &UserId,
        listing: Option<&ListingId>,
    ) -> Result<Conversation> {
        if counterpart == &self.viewer {
            return Err(ChatError::InvalidOperation(
                "cannot start a conversation with yourself".into(),
            ));
        }

        let req = CreateConversationRequest {
            user_id: counterpart.clone(),
            listing_id: listing.cloned(),
        };
        let conversation = self.transport.create_conversation(&req).await?;

        debug!(
            "Conversation {} with {} (listing {:?})",
            conversation.id,
            counterpart,
            listing.map(ListingId::as_str)
        );
        self.cache.store_conversation(&conversation);
        Ok(conversation)
    }

    /// One page of conversations, most recent activity first. A user with no
    /// conversations gets an empty page.
    pub async fn list_conversations(&self, page: u32, limit: u32) -> Result<Page<Conversation>> {
        let query = page_query(page, limit)?;
        let mut result = self.transport.list_conversations(query).await?;

        if result.items.len() > query.limit as usize {
            warn!(
                "Backend returned {} conversations for limit {}, truncating",
                result.items.len(),
                query.limit
            );
            result.items.truncate(query.limit as usize);
        }
        sort_by_activity(&mut result.items);

        self.cache.store_conversations(&result.items);
        Ok(result)
    }

    /// First page with the default size.
    pub async fn recent_conversations(&self) -> Result<Page<Conversation>> {
        self.list_conversations(1, DEFAULT_CONVERSATION_LIMIT).await
    }

    /// Every conversation, walking pages `1..=total_pages`. Conversations
    /// that shift between pages while walking are reported once.
    pub async fn list_all_conversations(&self, limit: u32) -> Result<Vec<Conversation>> {
        let mut seen = HashSet::new();
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            let result = self.list_conversations(page, limit).await?;
            let has_next = page < result.pagination.total_pages && !result.is_empty();

            for c in result.items {
                if seen.insert(c.id.clone()) {
                    all.push(c);
                }
            }

            if !has_next {
                break;
            }
            page += 1;
        }

        info!("Loaded {} conversations across {} pages", all.len(), page);
        sort_by_activity(&mut all);
        Ok(all)
    }

    /// Cached conversations for an instant render before a refetch.
    pub fn cached_conversations(&self) -> Vec<Conversation> {
        self.cache.conversations_by_activity()
    }

    /// Whether the cached directory is recent enough to skip a refetch.
    pub fn is_fresh(&self) -> bool {
        self.cache.directory_is_fresh()
    }
}
