//! Wire types for the Pager relay.
//!
//! Every body exchanged with the server is JSON with camelCase keys. The
//! same [`MessageEvent`] shape is used for the hub payload and for the
//! `data:` line of each stream frame.

use serde::{Deserialize, Serialize};

/// Status code carried in successful bodies.
pub const STATUS_OK: u16 = 200;

/// Status code carried in bodies for rejected input.
pub const STATUS_BAD_REQUEST: u16 = 400;

/// Status code carried in bodies when the store collaborator fails.
pub const STATUS_UNAVAILABLE: u16 = 503;

/// A new-message event, published through the hub and delivered on streams.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    /// Always [`STATUS_OK`] for delivered events.
    pub status_code: u16,
    /// Sanitized message text.
    pub message: String,
    /// Correlation identifier supplied by the publishing client, if any.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "clientId")]
    pub correlation_id: Option<String>,
}

impl MessageEvent {
    /// Create a new event.
    #[must_use]
    pub fn new(message: impl Into<String>, correlation_id: Option<String>) -> Self {
        Self {
            status_code: STATUS_OK,
            message: message.into(),
            correlation_id,
        }
    }
}

/// Body of a publish request as sent by well-behaved clients.
///
/// The server does not deserialize into this type directly: it validates the
/// raw JSON so that type errors can be reported with a precise reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    /// Text to publish.
    pub message: String,
    /// Client-generated correlation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "clientId")]
    pub correlation_id: Option<String>,
}

impl PublishRequest {
    /// Create a request without a correlation identifier.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            correlation_id: None,
        }
    }

    /// Attach a correlation identifier.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Response body for the publish and read endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse {
    /// Mirrors the HTTP status of the response.
    pub status_code: u16,
    /// Sanitized text on success, human-readable reason on failure.
    pub message: String,
}

impl ApiResponse {
    /// A successful response.
    #[must_use]
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_OK,
            message: message.into(),
        }
    }

    /// A rejected-input response.
    #[must_use]
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_BAD_REQUEST,
            message: reason.into(),
        }
    }

    /// A store-failure response.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            status_code: STATUS_UNAVAILABLE,
            message: reason.into(),
        }
    }

    /// Whether the body reports success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

/// One event frame on a stream connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFrame {
    /// Per-connection sequence number, starting at 1.
    pub seq: u64,
    /// The delivered event.
    pub event: MessageEvent,
}

impl StreamFrame {
    /// Create a new frame.
    #[must_use]
    pub fn new(seq: u64, event: MessageEvent) -> Self {
        Self { seq, event }
    }
}
