/// Shared chat types for the Roomly marketplace client.
///
/// `models` holds the domain entities, `api` the REST request/response
/// shapes (including the response envelope), and `events` the messages
/// pushed by the real-time collaborator.
pub mod api;
pub mod events;
pub mod models;
