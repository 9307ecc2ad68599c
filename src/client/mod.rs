//! Client SDK for the messaging service.
//!
//! Three pieces, wired together by the embedding application:
//!
//! - [`api::ApiClient`] — the REST surface (history, sends, seen marks).
//!   REST is the source of truth; it is always re-fetched on reconnect.
//! - [`cache::ChatCache`] — pure in-memory state that merges optimistic
//!   local sends with server-confirmed messages and push events, without
//!   ever duplicating or reordering confirmed history.
//! - [`session::ChannelSession`] — the live event connection, owned by the
//!   login session: constructed on login, shut down on logout, reconnecting
//!   with bounded backoff in between.

pub mod api;
pub mod cache;
pub mod session;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The request hit the fixed timeout. The send may or may not have
    /// reached the server; retrying is an explicit user decision.
    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    /// The server rejected the request; `kind` is the machine-readable
    /// error kind from the response body.
    #[error("api error ({status}): {message}")]
    Api {
        status: u16,
        kind: String,
        message: String,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

impl ClientError {
    pub fn kind(&self) -> Option<&str> {
        match self {
            ClientError::Api { kind, .. } => Some(kind),
            _ => None,
        }
    }
}
