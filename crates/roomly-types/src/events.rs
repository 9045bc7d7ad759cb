use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ConversationId, Message, UserId};

/// Events pushed by the real-time collaborator (socket or polling layer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ChatEvent {
    /// A message was posted to one of the viewer's conversations
    MessageCreated {
        message: Message,
        #[serde(rename = "senderName")]
        sender_name: String,
    },

    /// Someone read a conversation up to `read_at`
    ConversationRead {
        #[serde(rename = "conversationId")]
        conversation_id: ConversationId,
        #[serde(rename = "readerId")]
        reader_id: UserId,
        #[serde(rename = "readAt")]
        read_at: DateTime<Utc>,
    },
}

impl ChatEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::MessageCreated { message, .. } => &message.conversation_id,
            Self::ConversationRead { conversation_id, .. } => conversation_id,
        }
    }
}
