use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use roomly_types::models::UserId;

use crate::cache::CacheTtl;
use crate::error::{ChatError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);
pub const DEFAULT_STATE_DIR: &str = ".roomly";

/// Everything the chat client needs from its environment. The session
/// (token and viewer id) is handed over by the auth collaborator.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Base URL of the REST API. Always ends in `/` so endpoint paths join under it.
    pub api_url: Url,
    pub token: Option<String>,
    pub viewer: UserId,
    pub timeout: Duration,
    /// Where local client state (the notification prompt dismissal) lives.
    pub state_dir: PathBuf,
    pub cache_ttl: CacheTtl,
}

impl ChatConfig {
    pub fn new(api_url: &str, viewer: impl Into<UserId>) -> Result<Self> {
        Ok(Self {
            api_url: parse_api_url(api_url)?,
            token: None,
            viewer: viewer.into(),
            timeout: DEFAULT_TIMEOUT,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            cache_ttl: CacheTtl::default(),
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }
}

fn parse_api_url(raw: &str) -> Result<Url> {
    let mut url =
        Url::parse(raw).map_err(|e| ChatError::Config(format!("invalid API URL '{}': {}", raw, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ChatError::Config(format!(
            "API URL must be http or https, got '{}'",
            url.scheme()
        )));
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
