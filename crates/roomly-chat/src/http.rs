use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::{DeserializeOwned, IgnoredAny};
use tracing::debug;
use url::Url;

use roomly_types::api::{
    CreateConversationRequest, Envelope, Page, PageQuery, Pagination, SendMessageRequest,
    UnreadCount,
};
use roomly_types::models::{Conversation, ConversationId, Message};

use crate::config::ChatConfig;
use crate::error::{ChatError, Result};
use crate::transport::ChatTransport;

/// REST transport over `reqwest`. Decodes the response envelope strictly:
/// a missing or mis-shaped `data` is an error, never a silent fallback.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ChatError::Config(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: config.api_url.clone(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ChatError::Config(format!("bad endpoint '{}': {}", path, e)))
    }

    /// `chat/conversations/{id}/{tail}` with the id percent-encoded as one segment.
    fn conversation_url(&self, conversation: &ConversationId, tail: &str) -> Result<Url> {
        let mut url = self.url("chat/conversations")?;
        url.path_segments_mut()
            .map_err(|_| ChatError::Config("API URL cannot be a base".into()))?
            .push(conversation.as_str())
            .push(tail);
        Ok(url)
    }

    async fn execute<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Envelope<T>> {
        let req = match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        };

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        debug!("{} ({} bytes)", status, body.len());

        decode_envelope(status, &body)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn create_conversation(&self, req: &CreateConversationRequest) -> Result<Conversation> {
        let url = self.url("chat/conversations")?;
        debug!("POST {}", url);
        let envelope = self.execute(self.client.post(url).json(req)).await?;
        require_data(envelope)
    }

    async fn list_conversations(&self, query: PageQuery) -> Result<Page<Conversation>> {
        let url = self.url("chat/conversations")?;
        debug!("GET {} page={} limit={}", url, query.page, query.limit);
        let envelope: Envelope<Vec<Conversation>> =
            self.execute(self.client.get(url).query(&query)).await?;

        let pagination = envelope
            .pagination
            .ok_or_else(|| ChatError::Decode("conversation listing has no pagination".into()))?;
        Ok(Page {
            items: require_data(envelope)?,
            pagination,
        })
    }

    async fn list_messages(
        &self,
        conversation: &ConversationId,
        query: PageQuery,
    ) -> Result<Page<Message>> {
        let url = self.conversation_url(conversation, "messages")?;
        debug!("GET {} page={} limit={}", url, query.page, query.limit);
        let envelope: Envelope<Vec<Message>> =
            self.execute(self.client.get(url).query(&query)).await?;

        let pagination = envelope.pagination;
        let items = require_data(envelope)?;
        let pagination = pagination.unwrap_or_else(|| unpaged(query, items.len()));
        Ok(Page { items, pagination })
    }

    async fn send_message(
        &self,
        conversation: &ConversationId,
        req: &SendMessageRequest,
    ) -> Result<Message> {
        let url = self.conversation_url(conversation, "messages")?;
        debug!("POST {}", url);
        let envelope = self.execute(self.client.post(url).json(req)).await?;
        require_data(envelope)
    }

    async fn mark_read(&self, conversation: &ConversationId) -> Result<()> {
        let url = self.conversation_url(conversation, "read")?;
        debug!("POST {}", url);
        let _: Envelope<IgnoredAny> = self.execute(self.client.post(url)).await?;
        Ok(())
    }

    async fn unread_count(&self) -> Result<u64> {
        let url = self.url("chat/unread-count")?;
        debug!("GET {}", url);
        let envelope: Envelope<UnreadCount> = self.execute(self.client.get(url)).await?;
        Ok(require_data(envelope)?.count)
    }
}

// -- Envelope decoding --

/// Map a raw HTTP response onto the envelope or a `ChatError`.
///
/// 5xx is a transport failure. Other non-2xx statuses map by code, carrying
/// the envelope's error text when one is present. A 2xx with
/// `success: false` is an application-level `Api` error.
pub(crate) fn decode_envelope<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<Envelope<T>> {
    if status.is_server_error() {
        return Err(ChatError::Transport(format!("server returned {}", status)));
    }

    if body.iter().all(u8::is_ascii_whitespace) {
        if status.is_success() {
            return Ok(Envelope {
                success: true,
                data: None,
                message: None,
                error: None,
                pagination: None,
                errors: Vec::new(),
            });
        }
        return Err(status_error(status, None, None));
    }

    let envelope: Envelope<T> = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) if status.is_success() => return Err(ChatError::Decode(e.to_string())),
        Err(_) => return Err(status_error(status, None, None)),
    };

    if !status.is_success() {
        let field = envelope.errors.first().map(|e| e.field.clone());
        return Err(status_error(status, envelope.error_message(), field));
    }

    if !envelope.success {
        return Err(ChatError::Api {
            status: status.as_u16(),
            message: envelope.error_message().unwrap_or("request failed").to_string(),
        });
    }

    Ok(envelope)
}

fn status_error(status: StatusCode, message: Option<&str>, field: Option<String>) -> ChatError {
    let message = message
        .map(str::to_string)
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ChatError::Unauthorized,
        StatusCode::NOT_FOUND => ChatError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
            ChatError::Validation { message, field }
        }
        _ => ChatError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn require_data<T>(envelope: Envelope<T>) -> Result<T> {
    envelope
        .data
        .ok_or_else(|| ChatError::Decode("response envelope has no data".into()))
}

/// Cursor for a listing the backend returned without one: the requested page
/// with no known successor.
fn unpaged(query: PageQuery, len: usize) -> Pagination {
    Pagination {
        page: query.page,
        limit: query.limit,
        total: len as u64,
        total_pages: query.page,
    }
}
