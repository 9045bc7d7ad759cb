use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// -- Identifiers --

/// Backend identifiers are opaque strings. The backend emits them under
/// either `_id` or `id`; every entity here canonicalizes on `id` and accepts
/// `_id` as a decoding alias.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// A marketplace user (tenant or landlord).
    UserId
);
string_id!(ConversationId);
string_id!(MessageId);
string_id!(
    /// A room listing a conversation may be scoped to.
    ListingId
);

// -- Conversations --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(alias = "_id")]
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRef {
    #[serde(alias = "_id")]
    pub id: ListingId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub content: String,
    #[serde(alias = "sender")]
    pub sender_id: UserId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    #[serde(alias = "_id")]
    pub id: ConversationId,
    pub participants: Vec<Participant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub listing: Option<ListingRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<MessagePreview>,
    /// Unread messages for the viewer who fetched this conversation.
    #[serde(default)]
    pub unread_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Timestamp used for "most recent activity" ordering.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_message
            .as_ref()
            .map(|m| m.created_at.max(self.updated_at))
            .unwrap_or(self.updated_at)
    }

    pub fn has_participant(&self, user: &UserId) -> bool {
        self.participants.iter().any(|p| &p.id == user)
    }

    /// The other side of the conversation from `viewer`'s point of view.
    pub fn counterpart(&self, viewer: &UserId) -> Option<&Participant> {
        self.participants.iter().find(|p| &p.id != viewer)
    }
}

// -- Messages --

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    #[serde(alias = "image", alias = "file")]
    Attachment,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Attachment => f.write_str("attachment"),
        }
    }
}

/// `sent → delivered → read`. Ordered so that `max` picks the later state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryState {
    #[default]
    Sent,
    Delivered,
    Read,
}

/// A chat message. Immutable once created except for its delivery state,
/// which only ever moves forward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "MessageWire", into = "MessageWire")]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub sender_id: UserId,
    pub content: String,
    pub message_type: MessageType,
    /// Attachment references (upload URLs).
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub state: DeliveryState,
    pub read_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_read(&self) -> bool {
        self.state == DeliveryState::Read
    }

    /// Move the message forward to `state`. Returns false (and changes
    /// nothing) if the message is already at or past it.
    pub fn advance(&mut self, state: DeliveryState, at: Option<DateTime<Utc>>) -> bool {
        if state <= self.state {
            return false;
        }
        self.state = state;
        if state == DeliveryState::Read && self.read_at.is_none() {
            self.read_at = at;
        }
        true
    }

    /// Replace this message with a fresher copy of itself while keeping the
    /// furthest delivery state either copy has seen.
    pub fn merge(&mut self, fresh: Message) {
        let state = self.state.max(fresh.state);
        let read_at = self.read_at.or(fresh.read_at);
        *self = fresh;
        self.state = state;
        self.read_at = if state == DeliveryState::Read { read_at } else { None };
    }

    pub fn preview(&self) -> MessagePreview {
        MessagePreview {
            content: self.content.clone(),
            sender_id: self.sender_id.clone(),
            created_at: self.created_at,
        }
    }
}

/// Wire shape of a message. The backend reports read state as a `read`
/// flag and optionally a `status`; both collapse into `Message::state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageWire {
    #[serde(alias = "_id")]
    id: MessageId,
    #[serde(alias = "conversation")]
    conversation_id: ConversationId,
    #[serde(alias = "sender")]
    sender_id: UserId,
    #[serde(default)]
    content: String,
    #[serde(default)]
    message_type: MessageType,
    #[serde(default)]
    attachments: Vec<String>,
    #[serde(alias = "sentAt")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    read_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<DeliveryState>,
}

impl From<MessageWire> for Message {
    fn from(wire: MessageWire) -> Self {
        let flagged = if wire.read { DeliveryState::Read } else { DeliveryState::Sent };
        let state = flagged.max(wire.status.unwrap_or_default());
        Self {
            id: wire.id,
            conversation_id: wire.conversation_id,
            sender_id: wire.sender_id,
            content: wire.content,
            message_type: wire.message_type,
            attachments: wire.attachments,
            created_at: wire.created_at,
            state,
            read_at: if state == DeliveryState::Read { wire.read_at } else { None },
        }
    }
}

impl From<Message> for MessageWire {
    fn from(msg: Message) -> Self {
        Self {
            read: msg.is_read(),
            status: Some(msg.state),
            id: msg.id,
            conversation_id: msg.conversation_id,
            sender_id: msg.sender_id,
            content: msg.content,
            message_type: msg.message_type,
            attachments: msg.attachments,
            created_at: msg.created_at,
            read_at: msg.read_at,
        }
    }
}
