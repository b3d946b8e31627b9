//! The publish pipeline: validate, store, broadcast.

use crate::hub::{BroadcastHub, PublishReport, Topic};
use crate::store::{MessageStore, StoreError};
use crate::validator::{ValidationError, Validator};
use pager_protocol::MessageEvent;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Publish errors.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The body was rejected before touching the store or the hub.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// The store collaborator failed; nothing was broadcast.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

/// Result of a successful publish.
#[derive(Debug, Clone)]
pub struct Published {
    /// The event that was stored and broadcast.
    pub event: MessageEvent,
    /// Fan-out outcome.
    pub report: PublishReport,
}

/// Owns the latest-message slot and the hub that announces changes to it.
#[derive(Debug, Clone)]
pub struct Relay {
    validator: Validator,
    store: MessageStore,
    hub: BroadcastHub,
}

impl Relay {
    /// Create a relay from its parts.
    #[must_use]
    pub fn new(validator: Validator, store: MessageStore, hub: BroadcastHub) -> Self {
        Self {
            validator,
            store,
            hub,
        }
    }

    /// Validate, store and broadcast a raw publish body.
    ///
    /// The store write and the broadcast are not atomic: if the process dies
    /// between them the slot holds the new message but connected
    /// subscribers never hear of it.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::Invalid`] for rejected input and
    /// [`PublishError::StoreUnavailable`] if the store write fails.
    pub async fn publish(&self, body: Option<&Value>) -> Result<Published, PublishError> {
        let validated = self.validator.validate(body).map_err(|e| {
            debug!(reason = e.kind(), "Rejected publish");
            e
        })?;

        if let Err(e) = self.store.set(validated.text.as_str()).await {
            warn!(error = %e, "Failed to store latest message");
            return Err(e.into());
        }

        let event = MessageEvent::new(validated.text.into_string(), validated.correlation_id);
        let report = self.hub.publish(Topic::MessageNew, event.clone());

        debug!(
            recipients = report.delivered,
            correlated = event.correlation_id.is_some(),
            "Published message"
        );
        Ok(Published { event, report })
    }

    /// Read the latest stored message.
    ///
    /// # Errors
    ///
    /// Returns an error if the store collaborator fails.
    pub async fn latest(&self) -> Result<Option<String>, StoreError> {
        self.store.get().await
    }

    /// The hub used for broadcasts.
    #[must_use]
    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// The validator applied to publish bodies.
    #[must_use]
    pub fn validator(&self) -> &Validator {
        &self.validator
    }
}
