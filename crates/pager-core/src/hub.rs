//! In-process broadcast hub for Pager.
//!
//! The hub maps each [`Topic`] to an ordered list of registered handlers.
//! A handler is the sending half of a bounded channel; publishing never
//! waits on a slow subscriber.

use dashmap::DashMap;
use pager_protocol::MessageEvent;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, trace, warn};

/// Default per-subscriber buffer capacity.
pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 64;

/// A registered handler: the sending half of a subscriber's buffer.
pub type Handler = mpsc::Sender<Arc<MessageEvent>>;

/// Hub event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// A new latest message was published.
    MessageNew,
}

impl Topic {
    /// Wire name of the topic.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Topic::MessageNew => "message:new",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hub errors.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hub has been closed for shutdown.
    #[error("Hub is closed")]
    Closed,
}

/// Hub configuration.
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Buffer capacity of subscriptions created by [`BroadcastHub::subscribe`].
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Opaque handle identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    topic: Topic,
    id: u64,
}

impl SubscriptionHandle {
    /// Topic the registration belongs to.
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Hub-unique registration id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Handlers that accepted the event.
    pub delivered: usize,
    /// Handlers whose buffer was full; the event was dropped for them.
    pub lagged: usize,
    /// Handlers whose receiver was gone; they have been pruned.
    pub closed: usize,
}

/// Hub statistics.
#[derive(Debug, Clone)]
pub struct HubStats {
    /// Number of topics with at least one registration.
    pub topic_count: usize,
    /// Total registrations across all topics.
    pub subscriber_count: usize,
}

struct Registration {
    id: u64,
    handler: Handler,
}

struct HubInner {
    topics: DashMap<Topic, Vec<Registration>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    config: HubConfig,
}

impl HubInner {
    fn remove(&self, handle: &SubscriptionHandle) -> bool {
        let Some(mut entry) = self.topics.get_mut(&handle.topic) else {
            return false;
        };

        let before = entry.len();
        entry.retain(|r| r.id != handle.id);
        let removed = entry.len() != before;

        if entry.is_empty() {
            drop(entry); // Release the shard lock
            self.topics.remove_if(&handle.topic, |_, regs| regs.is_empty());
        }

        if removed {
            debug!(topic = %handle.topic, subscription = handle.id, "Unsubscribed");
        }
        removed
    }
}

/// The broadcast hub.
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create a hub with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HubConfig::default())
    }

    /// Create a hub with custom configuration.
    #[must_use]
    pub fn with_config(config: HubConfig) -> Self {
        info!("Creating broadcast hub with config: {:?}", config);
        Self {
            inner: Arc::new(HubInner {
                topics: DashMap::new(),
                next_id: AtomicU64::new(1),
                closed: AtomicBool::new(false),
                config,
            }),
        }
    }

    /// Register a handler under a topic.
    ///
    /// Registering the same handler twice yields two independent
    /// registrations, each of which receives every event.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] once the hub has been closed.
    pub fn register(&self, topic: Topic, handler: Handler) -> Result<SubscriptionHandle, HubError> {
        let entry = self.inner.topics.entry(topic);
        // `close` sets the flag before clearing shards, so a registration
        // that passes this check under the shard lock is cleared with it.
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(HubError::Closed);
        }
        let mut entry = entry.or_default();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        entry.push(Registration { id, handler });

        debug!(topic = %topic, subscription = id, subscribers = entry.len(), "Subscribed");
        Ok(SubscriptionHandle { topic, id })
    }

    /// Create a buffered subscription that unregisters itself on drop.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::Closed`] once the hub has been closed.
    pub fn subscribe(&self, topic: Topic) -> Result<Subscription, HubError> {
        let (tx, rx) = mpsc::channel(self.inner.config.subscriber_buffer.max(1));
        let handle = self.register(topic, tx)?;
        Ok(Subscription {
            handle,
            receiver: rx,
            hub: Arc::downgrade(&self.inner),
        })
    }

    /// Remove a registration.
    ///
    /// Returns `true` if it was registered. Removing twice is harmless.
    pub fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.inner.remove(handle)
    }

    /// Deliver an event to every handler registered under `topic`.
    ///
    /// Handlers are offered the event in registration order. A full or
    /// closed handler does not affect delivery to the others. Publishing to
    /// a topic with no handlers is a no-op.
    pub fn publish(&self, topic: Topic, event: MessageEvent) -> PublishReport {
        let targets: Vec<(u64, Handler)> = match self.inner.topics.get(&topic) {
            Some(entry) => entry
                .iter()
                .map(|r| (r.id, r.handler.clone()))
                .collect(),
            None => {
                trace!(topic = %topic, "Publish with no subscribers");
                return PublishReport::default();
            }
        };

        let event = Arc::new(event);
        let mut report = PublishReport::default();
        let mut dead = Vec::new();

        for (id, handler) in targets {
            match handler.try_send(Arc::clone(&event)) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(topic = %topic, subscription = id, "Subscriber buffer full, dropping event");
                    report.lagged += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    report.closed += 1;
                    dead.push(id);
                }
            }
        }

        for id in dead {
            self.inner.remove(&SubscriptionHandle { topic, id });
        }

        trace!(
            topic = %topic,
            delivered = report.delivered,
            lagged = report.lagged,
            "Published event"
        );
        report
    }

    /// Number of handlers registered under `topic`.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.inner.topics.get(&topic).map(|e| e.len()).unwrap_or(0)
    }

    /// Get hub statistics.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            topic_count: self.inner.topics.len(),
            subscriber_count: self.inner.topics.iter().map(|e| e.len()).sum(),
        }
    }

    /// Close the hub, dropping every registration.
    ///
    /// Open subscriptions drain what is already buffered and then end.
    /// Further registrations are refused. Returns the number dropped.
    pub fn close(&self) -> usize {
        self.inner.closed.store(true, Ordering::Release);
        let dropped = self.stats().subscriber_count;
        self.inner.topics.clear();
        info!(dropped, "Broadcast hub closed");
        dropped
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("config", &self.inner.config)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A live subscription owning its receive buffer.
///
/// Dropping the subscription removes its registration from the hub.
#[derive(Debug)]
pub struct Subscription {
    handle: SubscriptionHandle,
    receiver: mpsc::Receiver<Arc<MessageEvent>>,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// The registration handle.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }

    /// Receive the next event, or `None` once unregistered and drained.
    pub async fn recv(&mut self) -> Option<Arc<MessageEvent>> {
        self.receiver.recv().await
    }

    /// Poll for the next event.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<Arc<MessageEvent>>> {
        self.receiver.poll_recv(cx)
    }

    /// Take a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<MessageEvent>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(&self.handle);
        }
    }
}

impl fmt::Debug for HubInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubInner")
            .field("topics", &self.topics.len())
            .finish()
    }
}
