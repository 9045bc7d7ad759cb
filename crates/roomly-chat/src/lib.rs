/// Roomly chat client.
///
/// Conversation directory, message channel and notification bridge for the
/// marketplace's tenant/landlord messaging, over the backend's REST API.
/// The real-time transport lives elsewhere and feeds events in through
/// [`ChatClient::handle_event`].
pub mod cache;
pub mod channel;
pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod export;
pub mod http;
pub mod notify;
pub mod transport;

pub use client::ChatClient;
pub use config::ChatConfig;
pub use error::{ChatError, Result};
