use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use roomly_types::models::ConversationId;

use crate::error::Result;

/// Longest message body shown in a chat notification, in characters.
pub const PREVIEW_CHARS: usize = 100;

const PROMPT_STATE_FILE: &str = "notification-prompt.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Default,
    Granted,
    Denied,
}

/// Viewer notification preferences from their profile. `None` means the
/// viewer never chose, which does not suppress anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    pub push_notifications: Option<bool>,
    pub sound: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotificationOptions {
    pub body: Option<String>,
    pub icon: Option<String>,
    /// Notifications sharing a tag replace each other.
    pub tag: Option<String>,
    pub silent: bool,
    pub require_interaction: bool,
    /// Where a click should take the user; handed to the router.
    pub route: Option<String>,
    pub data: Option<serde_json::Value>,
}

/// What the platform is asked to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub title: String,
    pub options: NotificationOptions,
}

/// Returned for a notification that was actually displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationHandle {
    pub title: String,
    pub tag: Option<String>,
    route: Option<String>,
}

impl NotificationHandle {
    /// Route the routing collaborator should open when the notification is clicked.
    pub fn click_route(&self) -> Option<&str> {
        self.route.as_deref()
    }
}

// -- Platform seams --

/// The host's permission prompt and notification display.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    /// Current permission, or `None` where notifications are unavailable.
    fn permission(&self) -> Option<Permission>;

    /// Show the permission prompt and return the user's answer.
    async fn request_permission(&self) -> Permission;

    fn show(&self, notification: &Notification) -> Result<()>;
}

/// A host without notification support. Everything degrades to a no-op.
pub struct Unsupported;

#[async_trait]
impl NotificationPlatform for Unsupported {
    fn permission(&self) -> Option<Permission> {
        None
    }

    async fn request_permission(&self) -> Permission {
        Permission::Denied
    }

    fn show(&self, _notification: &Notification) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptState {
    pub dismissed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dismissed_at: Option<DateTime<Utc>>,
}

/// Local persistence for the one-time permission prompt.
pub trait PromptStore: Send + Sync {
    fn load(&self) -> Result<PromptState>;
    fn save(&self, state: &PromptState) -> Result<()>;
}

/// Prompt state as a JSON file in the client's state directory.
pub struct FilePromptStore {
    path: PathBuf,
}

impl FilePromptStore {
    pub fn new(state_dir: impl Into<PathBuf>) -> Self {
        Self {
            path: state_dir.into().join(PROMPT_STATE_FILE),
        }
    }
}

impl PromptStore for FilePromptStore {
    fn load(&self) -> Result<PromptState> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(PromptState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, state: &PromptState) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(&self.path, serde_json::to_vec_pretty(state)?)?;
        Ok(())
    }
}

/// In-process prompt state, forgotten on exit.
#[derive(Default)]
pub struct MemoryPromptStore {
    state: Mutex<PromptState>,
}

impl PromptStore for MemoryPromptStore {
    fn load(&self) -> Result<PromptState> {
        Ok(*self.state.lock().unwrap_or_else(|e| e.into_inner()))
    }

    fn save(&self, state: &PromptState) -> Result<()> {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = *state;
        Ok(())
    }
}

// -- Bridge --

#[derive(Debug, Clone, Copy)]
struct PermissionState {
    permission: Permission,
    enabled: bool,
}

/// Decides whether a chat event becomes a platform notification.
///
/// Holds the process-wide permission state: read from the platform on first
/// use and changed afterwards only by [`request_permission`](Self::request_permission).
/// Share one bridge (behind an `Arc`) across the process.
pub struct NotificationBridge {
    platform: Arc<dyn NotificationPlatform>,
    prompts: Arc<dyn PromptStore>,
    state: Mutex<Option<PermissionState>>,
    /// Held across the platform prompt so concurrent requests prompt once.
    prompting: tokio::sync::Mutex<()>,
    preferences: RwLock<Preferences>,
}

impl NotificationBridge {
    pub fn new(platform: Arc<dyn NotificationPlatform>, prompts: Arc<dyn PromptStore>) -> Self {
        Self {
            platform,
            prompts,
            state: Mutex::new(None),
            prompting: tokio::sync::Mutex::new(()),
            preferences: RwLock::new(Preferences::default()),
        }
    }

    /// A bridge on a host without notifications.
    pub fn unsupported() -> Self {
        Self::new(Arc::new(Unsupported), Arc::new(MemoryPromptStore::default()))
    }

    fn current(&self) -> PermissionState {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state.get_or_insert_with(|| {
            let permission = self.platform.permission().unwrap_or(Permission::Denied);
            debug!("Notification permission initialized as {:?}", permission);
            PermissionState {
                permission,
                enabled: permission == Permission::Granted,
            }
        })
    }

    fn set_permission(&self, permission: Permission) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        *state = Some(PermissionState {
            permission,
            enabled: permission == Permission::Granted,
        });
    }

    pub fn is_supported(&self) -> bool {
        self.platform.permission().is_some()
    }

    pub fn permission(&self) -> Permission {
        self.current().permission
    }

    pub fn is_enabled(&self) -> bool {
        self.current().enabled
    }

    /// Ask the user for permission. Never prompts again once the answer is
    /// `denied`, and does not prompt when already `granted`.
    pub async fn request_permission(&self) -> Permission {
        if !self.is_supported() {
            return Permission::Denied;
        }

        let _prompting = self.prompting.lock().await;
        match self.permission() {
            Permission::Default => {}
            settled => {
                debug!("Permission already {:?}, not prompting", settled);
                return settled;
            }
        }

        let answer = self.platform.request_permission().await;
        info!("Notification permission answered: {:?}", answer);
        self.set_permission(answer);
        answer
    }

    pub fn preferences(&self) -> Preferences {
        *self.preferences.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_preferences(&self, preferences: Preferences) {
        *self.preferences.write().unwrap_or_else(|e| e.into_inner()) = preferences;
    }

    /// Display a notification. Returns `None` without touching the platform
    /// when the viewer turned push notifications off or permission is not
    /// granted; display failures are logged and also yield `None`.
    pub fn show_notification(
        &self,
        title: &str,
        options: NotificationOptions,
    ) -> Option<NotificationHandle> {
        let prefs = self.preferences();
        if prefs.push_notifications == Some(false) {
            return None;
        }
        if self.permission() != Permission::Granted {
            return None;
        }

        let mut options = options;
        if prefs.sound == Some(false) {
            options.silent = true;
        }

        let notification = Notification {
            title: title.to_string(),
            options,
        };
        match self.platform.show(&notification) {
            Ok(()) => Some(NotificationHandle {
                title: notification.title,
                tag: notification.options.tag,
                route: notification.options.route,
            }),
            Err(e) => {
                warn!("Notification display failed: {}", e);
                None
            }
        }
    }

    /// Notification for a new chat message. Clicking it opens the conversation.
    pub fn show_chat_notification(
        &self,
        sender_name: &str,
        message: &str,
        conversation: Option<&ConversationId>,
    ) -> Option<NotificationHandle> {
        let options = NotificationOptions {
            body: Some(preview(message)),
            tag: conversation.map(|c| format!("chat-{}", c)),
            route: conversation.map(|c| format!("/messages/{}", c)),
            data: conversation.map(|c| serde_json::json!({ "conversationId": c })),
            ..Default::default()
        };
        self.show_notification(&format!("New message from {}", sender_name), options)
    }

    /// Whether to show the one-time "enable notifications" prompt.
    pub fn should_show_prompt(&self) -> bool {
        if !self.is_supported() || self.permission() != Permission::Default {
            return false;
        }
        match self.prompts.load() {
            Ok(state) => !state.dismissed,
            Err(e) => {
                warn!("Prompt state unreadable, not prompting: {}", e);
                false
            }
        }
    }

    /// Remember that the user dismissed the prompt, across sessions.
    pub fn dismiss_prompt(&self) -> Result<()> {
        self.prompts.save(&PromptState {
            dismissed: true,
            dismissed_at: Some(Utc::now()),
        })
    }
}

fn preview(message: &str) -> String {
    if message.chars().count() <= PREVIEW_CHARS {
        return message.to_string();
    }
    let cut: String = message.chars().take(PREVIEW_CHARS).collect();
    format!("{}...", cut)
}
