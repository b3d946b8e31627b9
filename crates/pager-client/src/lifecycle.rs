//! Optimistic message tracking.
//!
//! Outbound messages appear locally the moment they are submitted and then
//! move through `sending -> sent -> acknowledged` (or `sending -> failed`) as
//! the publish call returns and the hub echoes them back. Echoes are matched
//! to local entries by correlation identifier through a hash index into an
//! append-only arena, so reconciliation stays O(1) however many messages are
//! tracked.

use pager_core::{ValidationError, Validator};
use pager_protocol::{MessageEvent, PublishRequest};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, trace};
use uuid::Uuid;

/// Stable identifier of a tracked message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(u64);

impl MessageId {
    /// The numeric value.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

/// Where a message came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Submitted on this client.
    Outbound,
    /// Received from the hub.
    Inbound,
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Submitted; the publish call has not returned.
    Sending,
    /// The server accepted the publish.
    Sent,
    /// The hub echoed the message back. Terminal.
    Acknowledged,
    /// The publish call failed. Terminal; never retried.
    Failed,
}

impl SendStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, SendStatus::Acknowledged | SendStatus::Failed)
    }

    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SendStatus::Sending => "sending",
            SendStatus::Sent => "sent",
            SendStatus::Acknowledged => "acknowledged",
            SendStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quick reactions, sent as ordinary messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    /// 👍
    ThumbsUp,
    /// ❤️
    Heart,
    /// ✨
    Sparkles,
    /// ❗
    Exclamation,
}

impl Reaction {
    /// Every reaction, in display order.
    pub const ALL: [Reaction; 4] = [
        Reaction::ThumbsUp,
        Reaction::Heart,
        Reaction::Sparkles,
        Reaction::Exclamation,
    ];

    /// The glyph sent as message text.
    #[must_use]
    pub fn glyph(self) -> &'static str {
        match self {
            Reaction::ThumbsUp => "👍",
            Reaction::Heart => "❤️",
            Reaction::Sparkles => "✨",
            Reaction::Exclamation => "❗",
        }
    }
}

/// A tracked message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Stable local identifier.
    pub id: MessageId,
    /// Present only on messages submitted by this client.
    pub correlation_id: Option<String>,
    /// Sanitized text.
    pub text: String,
    /// Outbound or inbound; never changes.
    pub direction: Direction,
    /// Current delivery status.
    pub status: SendStatus,
    /// Creation time on this process's monotonic clock.
    pub timestamp: Instant,
}

/// Lifecycle errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    /// The text would be rejected by the server.
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    /// No message has this identifier.
    #[error("Unknown message: {0}")]
    UnknownMessage(MessageId),

    /// The correlation identifier is already tracked.
    #[error("Correlation id already in use: {0}")]
    DuplicateCorrelationId(String),

    /// The requested transition leaves a terminal state.
    #[error("Cannot move {id} from {from} to {to}")]
    InvalidTransition {
        /// The message.
        id: MessageId,
        /// Its current status.
        from: SendStatus,
        /// The rejected target status.
        to: SendStatus,
    },
}

/// A submitted message and the request that publishes it.
#[derive(Debug, Clone)]
pub struct Outgoing {
    /// The local entry, now `sending`.
    pub id: MessageId,
    /// Body for the publish endpoint.
    pub request: PublishRequest,
}

/// What an echo did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    /// A local outbound message was confirmed.
    Acknowledged(MessageId),
    /// A new inbound message was appended.
    Appended(MessageId),
    /// The echo matched a message that can no longer change.
    Ignored(MessageId),
}

/// The client's message collection and its state machine.
#[derive(Debug)]
pub struct MessageLifecycle {
    validator: Validator,
    messages: Vec<Message>,
    by_correlation: HashMap<String, usize>,
    next_id: u64,
}

impl Default for MessageLifecycle {
    fn default() -> Self {
        Self::new(Validator::default())
    }
}

impl MessageLifecycle {
    /// Create an empty collection that checks text with `validator`.
    #[must_use]
    pub fn new(validator: Validator) -> Self {
        Self {
            validator,
            messages: Vec::new(),
            by_correlation: HashMap::new(),
            next_id: 1,
        }
    }

    /// Submit text under a fresh correlation identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LifecycleError::Invalid`] if the text is blank or too long.
    pub fn submit(&mut self, text: &str) -> Result<Outgoing, LifecycleError> {
        self.submit_with_correlation_id(text, Uuid::new_v4().to_string())
    }

    /// Submit a reaction glyph as an ordinary message.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in glyphs; the signature matches
    /// [`submit`](Self::submit).
    pub fn submit_reaction(&mut self, reaction: Reaction) -> Result<Outgoing, LifecycleError> {
        self.submit(reaction.glyph())
    }

    /// Submit text under a caller-chosen correlation identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is invalid or the identifier is already
    /// tracked.
    pub fn submit_with_correlation_id(
        &mut self,
        text: &str,
        correlation_id: String,
    ) -> Result<Outgoing, LifecycleError> {
        let sanitized = self.validator.sanitize(text)?;
        if self.by_correlation.contains_key(&correlation_id) {
            return Err(LifecycleError::DuplicateCorrelationId(correlation_id));
        }

        // The server sanitizes again, so the request carries the raw text.
        let request =
            PublishRequest::new(text.trim()).with_correlation_id(correlation_id.clone());

        let id = self.allocate_id();
        self.push(Message {
            id,
            correlation_id: Some(correlation_id.clone()),
            text: sanitized.into_string(),
            direction: Direction::Outbound,
            status: SendStatus::Sending,
            timestamp: Instant::now(),
        });
        self.by_correlation.insert(correlation_id, self.messages.len() - 1);

        debug!(message = %id, "Submitted");
        Ok(Outgoing { id, request })
    }

    /// Record that the publish call succeeded.
    ///
    /// A message the echo already confirmed stays `acknowledged`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown or failed messages.
    pub fn mark_sent(&mut self, id: MessageId) -> Result<SendStatus, LifecycleError> {
        let message = self.get_mut(id)?;
        match message.status {
            SendStatus::Sending => {
                message.status = SendStatus::Sent;
                trace!(message = %id, "Sent");
                Ok(SendStatus::Sent)
            }
            SendStatus::Sent | SendStatus::Acknowledged => Ok(message.status),
            SendStatus::Failed => Err(LifecycleError::InvalidTransition {
                id,
                from: SendStatus::Failed,
                to: SendStatus::Sent,
            }),
        }
    }

    /// Record that the publish call failed.
    ///
    /// A message the echo already confirmed stays `acknowledged`.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown messages or ones already `sent`.
    pub fn mark_failed(&mut self, id: MessageId) -> Result<SendStatus, LifecycleError> {
        let message = self.get_mut(id)?;
        match message.status {
            SendStatus::Sending => {
                message.status = SendStatus::Failed;
                debug!(message = %id, "Send failed");
                Ok(SendStatus::Failed)
            }
            SendStatus::Failed | SendStatus::Acknowledged => Ok(message.status),
            SendStatus::Sent => Err(LifecycleError::InvalidTransition {
                id,
                from: SendStatus::Sent,
                to: SendStatus::Failed,
            }),
        }
    }

    /// Reconcile an event delivered by the hub.
    pub fn apply_echo(&mut self, event: &MessageEvent) -> EchoOutcome {
        let slot = event
            .correlation_id
            .as_deref()
            .and_then(|cid| self.by_correlation.get(cid).copied());

        if let Some(slot) = slot {
            let message = &mut self.messages[slot];
            if message.status.is_terminal() {
                trace!(message = %message.id, status = %message.status, "Ignored echo");
                return EchoOutcome::Ignored(message.id);
            }
            message.status = SendStatus::Acknowledged;
            message.text.clone_from(&event.message);
            debug!(message = %message.id, "Acknowledged");
            return EchoOutcome::Acknowledged(message.id);
        }

        EchoOutcome::Appended(self.append_inbound(event.message.clone()))
    }

    /// Append a message received outside the stream, e.g. from a refresh.
    pub fn append_inbound(&mut self, text: String) -> MessageId {
        let id = self.allocate_id();
        self.push(Message {
            id,
            correlation_id: None,
            text,
            direction: Direction::Inbound,
            status: SendStatus::Acknowledged,
            timestamp: Instant::now(),
        });
        trace!(message = %id, "Appended inbound");
        id
    }

    /// Look up a message by id.
    #[must_use]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.slot(id).map(|i| &self.messages[i])
    }

    /// Look up a local message by correlation identifier.
    #[must_use]
    pub fn find_by_correlation_id(&self, correlation_id: &str) -> Option<&Message> {
        self.by_correlation
            .get(correlation_id)
            .map(|&i| &self.messages[i])
    }

    /// All messages in creation order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of tracked messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent inbound message.
    #[must_use]
    pub fn latest_inbound(&self) -> Option<&Message> {
        self.latest(Direction::Inbound)
    }

    /// The most recent outbound message.
    #[must_use]
    pub fn latest_outbound(&self) -> Option<&Message> {
        self.latest(Direction::Outbound)
    }

    /// Number of outbound messages still `sending`.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.direction == Direction::Outbound && m.status == SendStatus::Sending)
            .count()
    }

    fn latest(&self, direction: Direction) -> Option<&Message> {
        // Timestamps never decrease along the arena.
        self.messages.iter().rev().find(|m| m.direction == direction)
    }

    fn allocate_id(&mut self) -> MessageId {
        let id = MessageId(self.next_id);
        self.next_id += 1;
        id
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    fn slot(&self, id: MessageId) -> Option<usize> {
        // Ids are allocated densely from 1 in arena order.
        let index = usize::try_from(id.0).ok()?.checked_sub(1)?;
        (index < self.messages.len()).then_some(index)
    }

    fn get_mut(&mut self, id: MessageId) -> Result<&mut Message, LifecycleError> {
        let slot = self.slot(id).ok_or(LifecycleError::UnknownMessage(id))?;
        Ok(&mut self.messages[slot])
    }
}
