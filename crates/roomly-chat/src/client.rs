use std::sync::Arc;

use tracing::{debug, warn};

use roomly_types::events::ChatEvent;
use roomly_types::models::{ConversationId, Message, MessageType, UserId};

use crate::cache::ChatCache;
use crate::channel::MessageChannel;
use crate::config::ChatConfig;
use crate::directory::ConversationDirectory;
use crate::error::Result;
use crate::http::HttpTransport;
use crate::notify::{FilePromptStore, NotificationBridge, NotificationHandle, Unsupported};
use crate::transport::ChatTransport;

/// The messaging façade: directory, channel and notification bridge over
/// one transport and one cache.
pub struct ChatClient {
    viewer: UserId,
    cache: Arc<ChatCache>,
    directory: ConversationDirectory,
    channel: MessageChannel,
    notifications: Arc<NotificationBridge>,
}

impl ChatClient {
    pub fn new(
        viewer: UserId,
        transport: Arc<dyn ChatTransport>,
        cache: Arc<ChatCache>,
        notifications: Arc<NotificationBridge>,
    ) -> Self {
        Self {
            directory: ConversationDirectory::new(transport.clone(), cache.clone(), viewer.clone()),
            channel: MessageChannel::new(transport, cache.clone(), viewer.clone()),
            viewer,
            cache,
            notifications,
        }
    }

    /// HTTP client on a host without notification support.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config)?);
        let notifications = Arc::new(NotificationBridge::new(
            Arc::new(Unsupported),
            Arc::new(FilePromptStore::new(config.state_dir.clone())),
        ));
        Ok(Self::new(
            config.viewer.clone(),
            transport,
            Arc::new(ChatCache::new(config.cache_ttl)),
            notifications,
        ))
    }

    pub fn viewer(&self) -> &UserId {
        &self.viewer
    }

    pub fn directory(&self) -> &ConversationDirectory {
        &self.directory
    }

    pub fn channel(&self) -> &MessageChannel {
        &self.channel
    }

    pub fn notifications(&self) -> &NotificationBridge {
        &self.notifications
    }

    /// Select a conversation: load its latest page and mark it read.
    /// Incoming messages for the focused conversation neither count as
    /// unread nor notify.
    /// A failed open leaves no conversation focused.
    pub async fn open_conversation(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        self.cache.set_focus(Some(conversation.clone()));
        let opened = self.load_and_mark_read(conversation).await;
        if let Err(e) = &opened {
            warn!("Opening {} failed: {}", conversation, e);
            self.cache.set_focus(None);
        }
        opened
    }

    async fn load_and_mark_read(&self, conversation: &ConversationId) -> Result<Vec<Message>> {
        let messages = self.channel.recent_messages(conversation).await?;
        self.channel.mark_as_read(conversation).await?;
        Ok(self.cache.merge_messages(conversation, messages))
    }

    pub fn close_conversation(&self) {
        self.cache.set_focus(None);
    }

    /// Apply an event from the real-time collaborator. Returns the
    /// notification it produced, if any.
    pub fn handle_event(&self, event: ChatEvent) -> Option<NotificationHandle> {
        match event {
            ChatEvent::MessageCreated {
                message,
                sender_name,
            } => {
                if message.sender_id == self.viewer {
                    self.cache.record_sent(&message);
                    return None;
                }

                let focused = self.cache.is_focused(&message.conversation_id);
                self.cache.record_incoming(&message, !focused);
                if focused {
                    debug!("Message {} arrived in the open conversation", message.id);
                    return None;
                }

                let body = match message.message_type {
                    MessageType::Attachment if message.content.trim().is_empty() => {
                        "Sent an attachment"
                    }
                    _ => message.content.as_str(),
                };
                self.notifications.show_chat_notification(
                    &sender_name,
                    body,
                    Some(&message.conversation_id),
                )
            }
            ChatEvent::ConversationRead {
                conversation_id,
                reader_id,
                read_at,
            } => {
                if reader_id == self.viewer {
                    // read from another session of the same viewer
                    self.cache.mark_read_locally(&conversation_id, &self.viewer, read_at);
                } else {
                    self.cache.mark_sent_read(&conversation_id, &self.viewer, read_at);
                }
                None
            }
        }
    }
}
