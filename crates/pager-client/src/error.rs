//! Client errors.

use crate::lifecycle::LifecycleError;
use pager_protocol::ProtocolError;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server refused or failed the publish. Terminal for that message.
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// The event stream ended or broke.
    #[error("Stream disconnected")]
    StreamDisconnected,

    /// The read endpoint returned an error.
    #[error("Fetch failed: {0}")]
    FetchFailed(String),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed stream data.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local state machine error.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The client was shut down.
    #[error("Client is shut down")]
    Shutdown,
}
