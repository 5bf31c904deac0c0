//! Error types for the chat client.
//!
//! Two failure families cross the controller boundary: transport failures
//! (connection errors, non-success HTTP statuses) and protocol failures
//! (an `[ERROR]` payload sent by the backend inside the stream). Cancellation
//! is not an error, and persistence failures are logged and swallowed by the
//! controller rather than surfaced here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The user submitted an empty (or whitespace-only) message.
    #[error("message is empty")]
    EmptyMessage,

    /// The request could not be sent or the connection dropped mid-stream.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend reported a failure inside the stream via `[ERROR]`.
    #[error("backend error: {0}")]
    Protocol(String),
}

impl ChatError {
    /// True for connection-level failures, false for application-level ones.
    pub fn is_transport(&self) -> bool {
        matches!(self, ChatError::Network(_) | ChatError::Status { .. })
    }
}
