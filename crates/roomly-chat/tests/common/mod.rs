//! In-memory chat backend shared by the integration tests. Each session is
//! a `ChatTransport` acting as one signed-in user against the same world.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};

use roomly_chat::cache::{CacheTtl, ChatCache};
use roomly_chat::notify::{
    MemoryPromptStore, Notification, NotificationBridge, NotificationPlatform, Permission,
};
use roomly_chat::transport::ChatTransport;
use roomly_chat::{ChatClient, ChatError, Result};
use roomly_types::api::{CreateConversationRequest, Page, PageQuery, Pagination, SendMessageRequest};
use roomly_types::models::{
    Conversation, ConversationId, DeliveryState, ListingId, ListingRef, Message, MessagePreview,
    MessageType, Participant, UserId,
};

struct StoredConversation {
    id: ConversationId,
    members: [UserId; 2],
    listing: Option<ListingId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Default)]
struct World {
    conversations: Vec<StoredConversation>,
    messages: Vec<Message>,
    ticks: i64,
}

impl World {
    fn now(&mut self) -> DateTime<Utc> {
        self.ticks += 1;
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap() + Duration::minutes(self.ticks)
    }

    fn find(&self, id: &ConversationId, user: &UserId) -> Result<&StoredConversation> {
        let conv = self
            .conversations
            .iter()
            .find(|c| &c.id == id)
            .ok_or_else(|| ChatError::NotFound("Conversation not found".into()))?;
        if !conv.members.contains(user) {
            return Err(ChatError::Unauthorized);
        }
        Ok(conv)
    }

    fn view(&self, conv: &StoredConversation, viewer: &UserId) -> Conversation {
        let thread: Vec<&Message> = self.messages.iter().filter(|m| m.conversation_id == conv.id).collect();
        let last = thread.iter().max_by_key(|m| m.created_at);
        Conversation {
            id: conv.id.clone(),
            participants: conv
                .members
                .iter()
                .map(|id| Participant {
                    id: id.clone(),
                    name: format!("User {}", id),
                    avatar: None,
                })
                .collect(),
            listing: conv.listing.clone().map(|id| ListingRef { id, title: None }),
            last_message: last.map(|m| MessagePreview {
                content: m.content.clone(),
                sender_id: m.sender_id.clone(),
                created_at: m.created_at,
            }),
            unread_count: thread
                .iter()
                .filter(|m| &m.sender_id != viewer && !m.is_read())
                .count() as u32,
            created_at: conv.created_at,
            updated_at: conv.updated_at,
        }
    }
}

#[derive(Default)]
pub struct Backend {
    world: Mutex<World>,
    calls: AtomicUsize,
    offline: AtomicBool,
    stalled_sends: AtomicBool,
    /// Largest message page served, whatever limit was asked for. 0 is no cap.
    message_page_cap: AtomicU32,
}

impl Backend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session(self: &Arc<Self>, user: &str) -> Arc<Session> {
        Arc::new(Session {
            backend: self.clone(),
            user: UserId::from(user),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Sends never get an answer while set.
    pub fn stall_sends(&self, stalled: bool) {
        self.stalled_sends.store(stalled, Ordering::SeqCst);
    }

    pub fn cap_message_pages(&self, cap: u32) {
        self.message_page_cap.store(cap, Ordering::SeqCst);
    }

    fn enter(&self) -> Result<std::sync::MutexGuard<'_, World>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(ChatError::Transport("connection refused".into()));
        }
        Ok(self.world.lock().unwrap())
    }
}

pub struct Session {
    backend: Arc<Backend>,
    user: UserId,
}

#[async_trait]
impl ChatTransport for Session {
    async fn create_conversation(&self, req: &CreateConversationRequest) -> Result<Conversation> {
        let mut world = self.backend.enter()?;
        let pair = [self.user.clone(), req.user_id.clone()];

        let existing = world.conversations.iter().position(|c| {
            c.listing == req.listing_id && pair.iter().all(|u| c.members.contains(u))
        });
        let idx = match existing {
            Some(idx) => idx,
            None => {
                let now = world.now();
                let id = ConversationId::new(format!("c{}", world.conversations.len() + 1));
                world.conversations.push(StoredConversation {
                    id,
                    members: pair,
                    listing: req.listing_id.clone(),
                    created_at: now,
                    updated_at: now,
                });
                world.conversations.len() - 1
            }
        };
        Ok(world.view(&world.conversations[idx], &self.user))
    }

    async fn list_conversations(&self, query: PageQuery) -> Result<Page<Conversation>> {
        let world = self.backend.enter()?;
        let mut all: Vec<Conversation> = world
            .conversations
            .iter()
            .filter(|c| c.members.contains(&self.user))
            .map(|c| world.view(c, &self.user))
            .collect();
        all.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()).then_with(|| a.id.cmp(&b.id)));

        let total = all.len();
        let limit = query.limit as usize;
        let items = all
            .into_iter()
            .skip((query.page as usize - 1) * limit)
            .take(limit)
            .collect();
        Ok(Page {
            items,
            pagination: Pagination {
                page: query.page,
                limit: query.limit,
                total: total as u64,
                total_pages: total.div_ceil(limit) as u32,
            },
        })
    }

    async fn list_messages(&self, conversation: &ConversationId, query: PageQuery) -> Result<Page<Message>> {
        let world = self.backend.enter()?;
        world.find(conversation, &self.user)?;

        // Newest first, as the real backend pages.
        let mut thread: Vec<Message> = world
            .messages
            .iter()
            .filter(|m| &m.conversation_id == conversation)
            .cloned()
            .collect();
        thread.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let cap = self.backend.message_page_cap.load(Ordering::SeqCst);
        let query = if cap > 0 {
            PageQuery { limit: query.limit.min(cap), ..query }
        } else {
            query
        };
        let total = thread.len();
        let limit = query.limit as usize;
        let items = thread
            .into_iter()
            .skip((query.page as usize - 1) * limit)
            .take(limit)
            .collect();
        Ok(Page {
            items,
            pagination: Pagination {
                page: query.page,
                limit: query.limit,
                total: total as u64,
                total_pages: total.div_ceil(limit) as u32,
            },
        })
    }

    async fn send_message(&self, conversation: &ConversationId, req: &SendMessageRequest) -> Result<Message> {
        if self.backend.stalled_sends.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let mut world = self.backend.enter()?;
        world.find(conversation, &self.user)?;
        if req.message_type == MessageType::Text && req.content.trim().is_empty() {
            return Err(ChatError::Validation {
                message: "Content is required".into(),
                field: Some("content".into()),
            });
        }

        let now = world.now();
        let message = Message {
            id: format!("m{}", world.messages.len() + 1).into(),
            conversation_id: conversation.clone(),
            sender_id: self.user.clone(),
            content: req.content.clone(),
            message_type: req.message_type,
            attachments: req.attachments.clone(),
            created_at: now,
            state: DeliveryState::Sent,
            read_at: None,
        };
        world.messages.push(message.clone());
        if let Some(c) = world.conversations.iter_mut().find(|c| &c.id == conversation) {
            c.updated_at = now;
        }
        Ok(message)
    }

    async fn mark_read(&self, conversation: &ConversationId) -> Result<()> {
        let mut world = self.backend.enter()?;
        world.find(conversation, &self.user)?;
        let now = world.now();
        for m in world
            .messages
            .iter_mut()
            .filter(|m| &m.conversation_id == conversation && m.sender_id != self.user)
        {
            m.advance(DeliveryState::Read, Some(now));
        }
        Ok(())
    }

    async fn unread_count(&self) -> Result<u64> {
        let world = self.backend.enter()?;
        let mine: Vec<&ConversationId> = world
            .conversations
            .iter()
            .filter(|c| c.members.contains(&self.user))
            .map(|c| &c.id)
            .collect();
        Ok(world
            .messages
            .iter()
            .filter(|m| mine.contains(&&m.conversation_id) && m.sender_id != self.user && !m.is_read())
            .count() as u64)
    }
}

// -- Notification stub --

pub struct StubPlatform {
    pub permission: Option<Permission>,
    pub prompts: AtomicUsize,
    pub shown: Mutex<Vec<Notification>>,
}

impl StubPlatform {
    pub fn new(permission: Option<Permission>) -> Arc<Self> {
        Arc::new(Self {
            permission,
            prompts: AtomicUsize::new(0),
            shown: Mutex::new(Vec::new()),
        })
    }

    pub fn shown(&self) -> Vec<Notification> {
        self.shown.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationPlatform for StubPlatform {
    fn permission(&self) -> Option<Permission> {
        self.permission
    }

    async fn request_permission(&self) -> Permission {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        Permission::Granted
    }

    fn show(&self, notification: &Notification) -> Result<()> {
        self.shown.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// A client signed in as `user` against `backend`.
pub fn client(backend: &Arc<Backend>, user: &str, platform: Arc<StubPlatform>) -> ChatClient {
    let notifications = NotificationBridge::new(platform, Arc::new(MemoryPromptStore::default()));
    ChatClient::new(
        UserId::from(user),
        backend.session(user),
        Arc::new(ChatCache::new(CacheTtl::default())),
        Arc::new(notifications),
    )
}

pub fn quiet_client(backend: &Arc<Backend>, user: &str) -> ChatClient {
    client(backend, user, StubPlatform::new(Some(Permission::Default)))
}
