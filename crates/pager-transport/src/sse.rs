//! Event-stream transport.
//!
//! A [`StreamConnection`] bridges one hub subscription to one
//! server-to-client byte stream. Each published event becomes one encoded
//! frame tagged with the next per-connection sequence number.

use bytes::Bytes;
use futures_util::Stream;
use pager_core::{BroadcastHub, Subscription, SubscriptionHandle, Topic};
use pager_protocol::{codec, MessageEvent};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, trace};

use crate::traits::{ConnectionId, TransportError};

/// Stream connection configuration.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Interval between keep-alive comments on an idle stream.
    pub keep_alive: Option<Duration>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            keep_alive: Some(Duration::from_secs(15)),
        }
    }
}

/// One open event stream.
///
/// The hub registration lives exactly as long as this value: dropping the
/// connection (client disconnect, server shutdown) unregisters it.
#[derive(Debug)]
pub struct StreamConnection {
    id: ConnectionId,
    subscription: Subscription,
    next_seq: u64,
    keep_alive: Option<Interval>,
}

impl StreamConnection {
    /// Register with the hub and open a new stream.
    ///
    /// Must be called from within a tokio runtime when keep-alive is enabled.
    ///
    /// # Errors
    ///
    /// Returns an error if the hub refuses the registration.
    pub fn open(hub: &BroadcastHub, config: &StreamConfig) -> Result<Self, TransportError> {
        let subscription = hub.subscribe(Topic::MessageNew)?;
        let id = ConnectionId::generate();

        let keep_alive = config.keep_alive.filter(|d| !d.is_zero()).map(|period| {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        debug!(
            connection = %id,
            subscription = subscription.handle().id(),
            "Stream opened"
        );

        Ok(Self {
            id,
            subscription,
            next_seq: 1,
            keep_alive,
        })
    }

    /// The connection's identifier.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// The hub registration backing this stream.
    #[must_use]
    pub fn handle(&self) -> SubscriptionHandle {
        self.subscription.handle()
    }

    /// Sequence number of the last frame written, or 0 if none.
    #[must_use]
    pub fn last_seq(&self) -> u64 {
        self.next_seq - 1
    }

    fn encode_next(&mut self, event: &MessageEvent) -> Option<Bytes> {
        match codec::encode_event(self.next_seq, event) {
            Ok(bytes) => {
                trace!(connection = %self.id, seq = self.next_seq, "Writing frame");
                self.next_seq += 1;
                Some(bytes)
            }
            Err(e) => {
                // The sequence number is not consumed, so no gap is visible.
                error!(connection = %self.id, error = %e, "Failed to encode frame");
                None
            }
        }
    }
}

impl Stream for StreamConnection {
    type Item = Bytes;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        let this = self.get_mut();

        loop {
            match this.subscription.poll_recv(cx) {
                Poll::Ready(Some(event)) => {
                    if let Some(bytes) = this.encode_next(&event) {
                        return Poll::Ready(Some(bytes));
                    }
                }
                Poll::Ready(None) => {
                    debug!(connection = %this.id, "Hub ended subscription");
                    return Poll::Ready(None);
                }
                Poll::Pending => break,
            }
        }

        if let Some(interval) = this.keep_alive.as_mut() {
            if interval.poll_tick(cx).is_ready() {
                trace!(connection = %this.id, "Writing keep-alive");
                return Poll::Ready(Some(codec::keep_alive()));
            }
        }

        Poll::Pending
    }
}

impl Drop for StreamConnection {
    fn drop(&mut self) {
        debug!(
            connection = %self.id,
            frames = self.last_seq(),
            "Stream closed"
        );
    }
}
