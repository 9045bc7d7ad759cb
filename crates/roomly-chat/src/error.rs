use thiserror::Error;

/// Errors surfaced by the chat layer. Transport failures pass through
/// unchanged; nothing here retries.
#[derive(Error, Debug)]
pub enum ChatError {
    /// Network failure, timeout or a 5xx from the backend.
    #[error("Transport error: {0}")]
    Transport(String),

    /// 401/403 from the backend. The caller is expected to send the user to login.
    #[error("Unauthorized")]
    Unauthorized,

    /// Rejected input, either locally or by a 400/422 with a field-level cause.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    /// An operation that can never succeed, e.g. contacting yourself.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// `success: false` from the backend outside the cases above.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response did not have the expected shape.
    #[error("Unexpected response shape: {0}")]
    Decode(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
