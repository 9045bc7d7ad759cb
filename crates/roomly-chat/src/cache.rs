use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use roomly_types::models::{
    Conversation, ConversationId, DeliveryState, Message, MessageId, MessageType, UserId,
};

// -- Freshness tiers --

/// Freshness tiers for cached data, shortest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    /// Unread badge.
    Realtime,
    /// Message pages.
    Short,
    /// Conversation directory.
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub realtime: Duration,
    pub short: Duration,
    pub medium: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            realtime: Duration::from_secs(30),
            short: Duration::from_secs(60),
            medium: Duration::from_secs(5 * 60),
        }
    }
}

impl CacheTtl {
    pub fn ttl(&self, tier: Tier) -> Duration {
        match tier {
            Tier::Realtime => self.realtime,
            Tier::Short => self.short,
            Tier::Medium => self.medium,
        }
    }
}

// -- Pending messages --

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingStatus {
    Sending,
    Failed(String),
}

/// A message the viewer sent that the backend has not acknowledged yet.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    /// Local reference, unrelated to the id the backend will assign.
    pub reference: Uuid,
    pub conversation_id: ConversationId,
    pub content: String,
    pub message_type: MessageType,
    pub attachments: Vec<String>,
    pub queued_at: DateTime<Utc>,
    pub status: PendingStatus,
}

// -- Cache --

#[derive(Default)]
struct Thread {
    messages: HashMap<MessageId, Message>,
    fetched_at: Option<Instant>,
    pending: Vec<PendingMessage>,
}

#[derive(Default)]
struct CacheInner {
    conversations: HashMap<ConversationId, Conversation>,
    directory_fetched_at: Option<Instant>,
    threads: HashMap<ConversationId, Thread>,
    unread_total: Option<(u64, Instant)>,
    focused: Option<ConversationId>,
}

/// Single owned cache of conversations and messages keyed by conversation
/// id. The backend stays the source of truth; every mutating call goes
/// through one of the hooks below so the cache never drifts per component.
///
/// Writes are last-write-wins per conversation, except message delivery
/// state, which only moves forward.
pub struct ChatCache {
    inner: RwLock<CacheInner>,
    ttl: CacheTtl,
}

impl ChatCache {
    pub fn new(ttl: CacheTtl) -> Self {
        Self {
            inner: RwLock::new(CacheInner::default()),
            ttl,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CacheInner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheInner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    fn fresh(&self, at: Option<Instant>, tier: Tier) -> bool {
        at.is_some_and(|t| t.elapsed() < self.ttl.ttl(tier))
    }

    // -- Conversations --

    pub fn store_conversations(&self, conversations: &[Conversation]) {
        let mut inner = self.write();
        for c in conversations {
            inner.conversations.insert(c.id.clone(), c.clone());
        }
        inner.directory_fetched_at = Some(Instant::now());
    }

    pub fn store_conversation(&self, conversation: &Conversation) {
        self.write()
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
    }

    pub fn conversation(&self, id: &ConversationId) -> Option<Conversation> {
        self.read().conversations.get(id).cloned()
    }

    /// Cached conversations, most recent activity first.
    pub fn conversations_by_activity(&self) -> Vec<Conversation> {
        let mut list: Vec<Conversation> = self.read().conversations.values().cloned().collect();
        sort_by_activity(&mut list);
        list
    }

    pub fn directory_is_fresh(&self) -> bool {
        let at = self.read().directory_fetched_at;
        self.fresh(at, Tier::Medium)
    }

    pub fn invalidate_directory(&self) {
        self.write().directory_fetched_at = None;
    }

    // -- Messages --

    /// Merge a fetched page into the thread and return the merged copies in
    /// page order. A stale page can never move a message's state backwards.
    pub fn merge_messages(&self, conversation: &ConversationId, page: Vec<Message>) -> Vec<Message> {
        let mut inner = self.write();
        let thread = inner.threads.entry(conversation.clone()).or_default();
        thread.fetched_at = Some(Instant::now());

        page.into_iter()
            .map(|msg| merge_into(thread, msg))
            .collect()
    }

    /// All cached messages of a conversation, oldest first.
    pub fn messages(&self, conversation: &ConversationId) -> Vec<Message> {
        let inner = self.read();
        let mut list: Vec<Message> = inner
            .threads
            .get(conversation)
            .map(|t| t.messages.values().cloned().collect())
            .unwrap_or_default();
        sort_chronological(&mut list);
        list
    }

    pub fn messages_are_fresh(&self, conversation: &ConversationId) -> bool {
        let at = self.read().threads.get(conversation).and_then(|t| t.fetched_at);
        self.fresh(at, Tier::Short)
    }

    // -- Pending sends --

    pub fn push_pending(&self, pending: PendingMessage) {
        let mut inner = self.write();
        inner
            .threads
            .entry(pending.conversation_id.clone())
            .or_default()
            .pending
            .push(pending);
    }

    pub fn pending(&self, conversation: &ConversationId) -> Vec<PendingMessage> {
        self.read()
            .threads
            .get(conversation)
            .map(|t| t.pending.clone())
            .unwrap_or_default()
    }

    /// Swap a pending entry for the acknowledged message.
    pub fn resolve_pending(&self, reference: Uuid, message: &Message) {
        let mut inner = self.write();
        if let Some(thread) = inner.threads.get_mut(&message.conversation_id) {
            thread.pending.retain(|p| p.reference != reference);
        }
        store_sent(&mut inner, message);
    }

    pub fn fail_pending(&self, conversation: &ConversationId, reference: Uuid, reason: String) {
        let mut inner = self.write();
        if let Some(p) = inner
            .threads
            .get_mut(conversation)
            .and_then(|t| t.pending.iter_mut().find(|p| p.reference == reference))
        {
            p.status = PendingStatus::Failed(reason);
        }
    }

    /// Drop a pending entry. Returns whether one was removed.
    pub fn discard_pending(&self, reference: Uuid) -> bool {
        let mut inner = self.write();
        for thread in inner.threads.values_mut() {
            let before = thread.pending.len();
            thread.pending.retain(|p| p.reference != reference);
            if thread.pending.len() != before {
                return true;
            }
        }
        false
    }

    // -- Invalidation hooks --

    /// After a send: store the message, move the conversation preview and
    /// mark the directory stale.
    pub fn record_sent(&self, message: &Message) {
        store_sent(&mut self.write(), message);
    }

    /// An incoming message from someone else. `count_unread` is false when
    /// the viewer is looking at the conversation.
    pub fn record_incoming(&self, message: &Message, count_unread: bool) {
        let mut inner = self.write();
        let thread = inner.threads.entry(message.conversation_id.clone()).or_default();
        let known = thread.messages.contains_key(&message.id);
        merge_into(thread, message.clone());
        touch_preview(&mut inner, message);

        if count_unread && !known && !message.is_read() {
            if let Some(c) = inner.conversations.get_mut(&message.conversation_id) {
                c.unread_count += 1;
            }
            if let Some((total, _)) = inner.unread_total.as_mut() {
                *total += 1;
            }
        }
    }

    /// The viewer read `conversation`: its counter drops to zero and every
    /// message the viewer received advances to `read`.
    pub fn mark_read_locally(&self, conversation: &ConversationId, viewer: &UserId, at: DateTime<Utc>) {
        let mut inner = self.write();
        if let Some(c) = inner.conversations.get_mut(conversation) {
            c.unread_count = 0;
        }
        if let Some(thread) = inner.threads.get_mut(conversation) {
            for msg in thread.messages.values_mut().filter(|m| &m.sender_id != viewer) {
                msg.advance(DeliveryState::Read, Some(at));
            }
        }
        inner.unread_total = None;
    }

    /// The counterpart read `conversation`: the viewer's own messages up to
    /// `at` advance to `read`.
    pub fn mark_sent_read(&self, conversation: &ConversationId, viewer: &UserId, at: DateTime<Utc>) {
        let mut inner = self.write();
        if let Some(thread) = inner.threads.get_mut(conversation) {
            for msg in thread
                .messages
                .values_mut()
                .filter(|m| &m.sender_id == viewer && m.created_at <= at)
            {
                msg.advance(DeliveryState::Read, Some(at));
            }
        }
    }

    // -- Unread total --

    pub fn store_unread_total(&self, count: u64) {
        self.write().unread_total = Some((count, Instant::now()));
    }

    /// The cached unread total, if still within its tier.
    pub fn unread_total(&self) -> Option<u64> {
        let cached = self.read().unread_total;
        cached.filter(|(_, at)| self.fresh(Some(*at), Tier::Realtime)).map(|(n, _)| n)
    }

    // -- Focus --

    pub fn set_focus(&self, conversation: Option<ConversationId>) {
        self.write().focused = conversation;
    }

    pub fn is_focused(&self, conversation: &ConversationId) -> bool {
        self.read().focused.as_ref() == Some(conversation)
    }
}

fn merge_into(thread: &mut Thread, msg: Message) -> Message {
    match thread.messages.get_mut(&msg.id) {
        Some(existing) => {
            existing.merge(msg);
            existing.clone()
        }
        None => {
            thread.messages.insert(msg.id.clone(), msg.clone());
            msg
        }
    }
}

fn store_sent(inner: &mut CacheInner, message: &Message) {
    let thread = inner.threads.entry(message.conversation_id.clone()).or_default();
    merge_into(thread, message.clone());
    touch_preview(inner, message);
    inner.directory_fetched_at = None;
}

fn touch_preview(inner: &mut CacheInner, message: &Message) {
    if let Some(c) = inner.conversations.get_mut(&message.conversation_id) {
        let newer = c
            .last_message
            .as_ref()
            .is_none_or(|m| m.created_at <= message.created_at);
        if newer {
            c.last_message = Some(message.preview());
            c.updated_at = c.updated_at.max(message.created_at);
        }
    }
}

/// Most recent activity first; ties keep their incoming order.
pub(crate) fn sort_by_activity(list: &mut [Conversation]) {
    list.sort_by(|a, b| b.last_activity().cmp(&a.last_activity()));
}

/// Oldest first, by server timestamp then id.
pub(crate) fn sort_chronological(list: &mut [Message]) {
    list.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, min, 0).unwrap()
    }

    fn message(id: &str, sender: &str, min: u32) -> Message {
        Message {
            id: id.into(),
            conversation_id: "c1".into(),
            sender_id: sender.into(),
            content: format!("message {}", id),
            message_type: MessageType::Text,
            attachments: vec![],
            created_at: at(min),
            state: DeliveryState::Sent,
            read_at: None,
        }
    }

    fn conversation(id: &str, min: u32) -> Conversation {
        Conversation {
            id: id.into(),
            participants: vec![],
            listing: None,
            last_message: None,
            unread_count: 2,
            created_at: at(0),
            updated_at: at(min),
        }
    }

    #[test]
    fn stale_page_cannot_unread_a_message() {
        let cache = ChatCache::new(CacheTtl::default());
        let c1 = ConversationId::from("c1");
        let viewer = UserId::from("u2");

        cache.merge_messages(&c1, vec![message("m1", "u1", 1)]);
        cache.mark_read_locally(&c1, &viewer, at(5));

        // An in-flight fetch started before the read lands afterwards.
        let merged = cache.merge_messages(&c1, vec![message("m1", "u1", 1)]);
        assert_eq!(merged[0].state, DeliveryState::Read);
        assert_eq!(merged[0].read_at, Some(at(5)));
    }

    #[test]
    fn mark_read_skips_viewers_own_messages() {
        let cache = ChatCache::new(CacheTtl::default());
        let c1 = ConversationId::from("c1");
        let viewer = UserId::from("u2");
        cache.store_conversations(&[conversation("c1", 1)]);
        cache.merge_messages(&c1, vec![message("m1", "u1", 1), message("m2", "u2", 2)]);

        cache.mark_read_locally(&c1, &viewer, at(5));

        let msgs = cache.messages(&c1);
        assert!(msgs[0].is_read());
        assert!(!msgs[1].is_read());
        assert_eq!(cache.conversation(&c1).unwrap().unread_count, 0);
    }

    #[test]
    fn counterpart_read_only_covers_earlier_messages() {
        let cache = ChatCache::new(CacheTtl::default());
        let c1 = ConversationId::from("c1");
        let viewer = UserId::from("u1");
        cache.merge_messages(&c1, vec![message("m1", "u1", 1), message("m2", "u1", 9)]);

        cache.mark_sent_read(&c1, &viewer, at(5));

        let msgs = cache.messages(&c1);
        assert!(msgs[0].is_read());
        assert!(!msgs[1].is_read());
    }

    #[test]
    fn incoming_bumps_unread_once() {
        let cache = ChatCache::new(CacheTtl::default());
        let c1 = ConversationId::from("c1");
        cache.store_conversations(&[conversation("c1", 1)]);
        cache.store_unread_total(4);

        let msg = message("m3", "u1", 3);
        cache.record_incoming(&msg, true);
        cache.record_incoming(&msg, true);

        let conv = cache.conversation(&c1).unwrap();
        assert_eq!(conv.unread_count, 3);
        assert_eq!(conv.last_message.unwrap().content, "message m3");
        assert_eq!(cache.unread_total(), Some(5));
    }

    #[test]
    fn pending_lifecycle() {
        let cache = ChatCache::new(CacheTtl::default());
        let c1 = ConversationId::from("c1");
        let reference = Uuid::new_v4();
        cache.push_pending(PendingMessage {
            reference,
            conversation_id: c1.clone(),
            content: "hello".into(),
            message_type: MessageType::Text,
            attachments: vec![],
            queued_at: at(1),
            status: PendingStatus::Sending,
        });
        assert_eq!(cache.pending(&c1).len(), 1);

        cache.fail_pending(&c1, reference, "offline".into());
        assert_eq!(cache.pending(&c1)[0].status, PendingStatus::Failed("offline".into()));

        assert!(cache.discard_pending(reference));
        assert!(!cache.discard_pending(reference));
        assert!(cache.pending(&c1).is_empty());
    }

    #[test]
    fn send_invalidates_directory() {
        let cache = ChatCache::new(CacheTtl::default());
        cache.store_conversations(&[conversation("c1", 1)]);
        assert!(cache.directory_is_fresh());

        cache.record_sent(&message("m1", "u2", 2));
        assert!(!cache.directory_is_fresh());
    }

    #[test]
    fn zero_ttl_is_never_fresh() {
        let cache = ChatCache::new(CacheTtl {
            realtime: Duration::ZERO,
            short: Duration::ZERO,
            medium: Duration::ZERO,
        });
        cache.store_unread_total(1);
        cache.store_conversations(&[]);
        assert_eq!(cache.unread_total(), None);
        assert!(!cache.directory_is_fresh());
    }

    #[test]
    fn activity_order_is_descending() {
        let mut list = vec![conversation("old", 1), conversation("new", 30), conversation("mid", 10)];
        sort_by_activity(&mut list);
        let ids: Vec<&str> = list.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["new", "mid", "old"]);
    }
}
