//! The messaging client.
//!
//! [`MessagingClient`] owns a [`MessageLifecycle`] and drives it from two
//! directions: [`send`](MessagingClient::send) submits optimistically and
//! settles on the publish result, while a background stream task applies
//! hub echoes. A dropped stream marks the device offline and schedules one
//! reconnect after a fixed delay.

use crate::error::ClientError;
use crate::lifecycle::{
    EchoOutcome, LifecycleError, Message, MessageId, MessageLifecycle, Outgoing, Reaction,
};
use crate::reconnect::Reconnector;
use crate::transport::{ClientConfig, HttpTransport, SendTransport, StreamSource};
use futures_util::StreamExt;
use pager_core::Validator;
use pager_protocol::MessageEvent;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const UPDATE_CAPACITY: usize = 256;

/// Connection status shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// The event stream is open.
    Online,
    /// A refresh is in progress.
    Syncing,
    /// No stream; a reconnect may be pending.
    Offline,
}

impl ConnectionStatus {
    /// Lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionStatus::Online => "online",
            ConnectionStatus::Syncing => "syncing",
            ConnectionStatus::Offline => "offline",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the device's connection and queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    /// Current connection status.
    pub status: ConnectionStatus,
    /// Wall-clock time of the last successful sync, if any.
    pub last_sync: Option<SystemTime>,
    /// Outbound messages still `sending`.
    pub queue_count: usize,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Offline,
            last_sync: None,
            queue_count: 0,
        }
    }
}

struct ClientInner {
    sender: Arc<dyn SendTransport>,
    source: Arc<dyn StreamSource>,
    lifecycle: Mutex<MessageLifecycle>,
    last_seen: Mutex<Option<String>>,
    state: watch::Sender<DeviceState>,
    updates: broadcast::Sender<Message>,
    reconnector: Reconnector,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    streaming: AtomicBool,
    online: AtomicBool,
    shut_down: AtomicBool,
    shutdown_notify: Notify,
}

impl ClientInner {
    fn set_status(&self, status: ConnectionStatus) {
        self.state.send_if_modified(|s| {
            let changed = s.status != status;
            s.status = status;
            changed
        });
    }

    /// Leave `syncing` for whatever the stream says now.
    fn end_syncing(&self) {
        let status = if self.online.load(Ordering::Acquire) {
            ConnectionStatus::Online
        } else {
            ConnectionStatus::Offline
        };
        self.state.send_if_modified(|s| {
            if s.status != ConnectionStatus::Syncing {
                return false;
            }
            s.status = status;
            true
        });
    }

    fn mark_synced(&self) {
        self.state.send_modify(|s| s.last_sync = Some(SystemTime::now()));
    }

    fn sync_queue_count(&self, lifecycle: &MessageLifecycle) {
        let queued = lifecycle.queued_count();
        self.state.send_if_modified(|s| {
            let changed = s.queue_count != queued;
            s.queue_count = queued;
            changed
        });
    }

    fn notify(&self, lifecycle: &MessageLifecycle, id: MessageId) {
        if let Some(message) = lifecycle.get(id) {
            // No receivers is fine.
            let _ = self.updates.send(message.clone());
        }
    }

    fn handle_event(&self, event: &MessageEvent) {
        let mut lifecycle = self.lifecycle.lock();
        let outcome = lifecycle.apply_echo(event);
        match outcome {
            EchoOutcome::Acknowledged(id) | EchoOutcome::Appended(id) => {
                self.notify(&lifecycle, id);
            }
            EchoOutcome::Ignored(_) => {}
        }
        self.sync_queue_count(&lifecycle);
        drop(lifecycle);

        *self.last_seen.lock() = Some(event.message.clone());
        self.mark_synced();
    }

    /// Start the stream task unless one is already running.
    fn connect(self: &Arc<Self>) -> bool {
        if self.shut_down.load(Ordering::Acquire) {
            return false;
        }
        if self
            .streaming
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Already connected");
            return false;
        }

        let inner = Arc::clone(self);
        let handle = tokio::spawn(async move { inner.run_stream().await });
        *self.stream_task.lock() = Some(handle);
        true
    }

    async fn run_stream(self: Arc<Self>) {
        let reason = match self.source.open_stream().await {
            Ok(mut events) => {
                info!("Stream connected");
                self.online.store(true, Ordering::Release);
                self.set_status(ConnectionStatus::Online);
                self.mark_synced();

                loop {
                    match events.next().await {
                        Some(Ok(event)) => self.handle_event(&event),
                        Some(Err(e)) => break e,
                        None => break ClientError::StreamDisconnected,
                    }
                }
            }
            Err(e) => e,
        };

        self.online.store(false, Ordering::Release);
        self.streaming.store(false, Ordering::Release);
        if self.shut_down.load(Ordering::Acquire) {
            return;
        }

        warn!(
            error = %reason,
            delay_ms = self.reconnector.delay().as_millis() as u64,
            "Offline, reconnect scheduled"
        );
        self.set_status(ConnectionStatus::Offline);
        self.schedule_reconnect();
    }

    fn schedule_reconnect(self: &Arc<Self>) {
        let weak: Weak<Self> = Arc::downgrade(self);
        self.reconnector.schedule(move || async move {
            if let Some(inner) = weak.upgrade() {
                inner.connect();
            }
        });
    }
}

/// A client for the Pager relay.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MessagingClient {
    inner: Arc<ClientInner>,
}

impl MessagingClient {
    /// Create a client over the given transports.
    #[must_use]
    pub fn new(
        sender: Arc<dyn SendTransport>,
        source: Arc<dyn StreamSource>,
        reconnect_delay: Duration,
    ) -> Self {
        let (state, _) = watch::channel(DeviceState::default());
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);

        Self {
            inner: Arc::new(ClientInner {
                sender,
                source,
                lifecycle: Mutex::new(MessageLifecycle::new(Validator::default())),
                last_seen: Mutex::new(None),
                state,
                updates,
                reconnector: Reconnector::new(reconnect_delay),
                stream_task: Mutex::new(None),
                streaming: AtomicBool::new(false),
                online: AtomicBool::new(false),
                shut_down: AtomicBool::new(false),
                shutdown_notify: Notify::new(),
            }),
        }
    }

    /// Create a client talking HTTP to the configured server.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn http(config: ClientConfig) -> Result<Self, ClientError> {
        let delay = config.reconnect_delay;
        let transport = Arc::new(HttpTransport::new(config)?);
        Ok(Self::new(transport.clone(), transport, delay))
    }

    /// Open the event stream. A no-op while a stream is already open.
    ///
    /// Returns `true` if a new connection attempt was started.
    pub fn connect(&self) -> bool {
        self.inner.connect()
    }

    /// Send a message.
    ///
    /// The message is tracked as `sending` before the publish call and ends
    /// `sent` or `failed` when it returns (or `acknowledged` if the echo
    /// arrived first). A transport failure is reported through the returned
    /// message's status, not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is invalid or the client is shut down.
    pub async fn send(&self, text: &str) -> Result<Message, ClientError> {
        let outgoing = self.submit(|lc| lc.submit(text))?;
        self.deliver(outgoing).await
    }

    /// Send a reaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the client is shut down.
    pub async fn send_reaction(&self, reaction: Reaction) -> Result<Message, ClientError> {
        let outgoing = self.submit(|lc| lc.submit_reaction(reaction))?;
        self.deliver(outgoing).await
    }

    fn submit<F>(&self, f: F) -> Result<Outgoing, ClientError>
    where
        F: FnOnce(&mut MessageLifecycle) -> Result<Outgoing, LifecycleError>,
    {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(ClientError::Shutdown);
        }
        let mut lifecycle = self.inner.lifecycle.lock();
        let outgoing = f(&mut lifecycle)?;
        self.inner.sync_queue_count(&lifecycle);
        self.inner.notify(&lifecycle, outgoing.id);
        Ok(outgoing)
    }

    async fn deliver(&self, outgoing: Outgoing) -> Result<Message, ClientError> {
        let result = self.inner.sender.publish(&outgoing.request).await;

        let mut lifecycle = self.inner.lifecycle.lock();
        match result {
            Ok(response) => {
                lifecycle.mark_sent(outgoing.id)?;
                // The slot now holds our own text; a refresh must not
                // bring it back as inbound.
                *self.inner.last_seen.lock() = Some(response.message);
            }
            Err(e) => {
                warn!(message = %outgoing.id, error = %e, "Publish failed");
                lifecycle.mark_failed(outgoing.id)?;
            }
        }
        self.inner.sync_queue_count(&lifecycle);
        self.inner.notify(&lifecycle, outgoing.id);

        lifecycle
            .get(outgoing.id)
            .cloned()
            .ok_or_else(|| LifecycleError::UnknownMessage(outgoing.id).into())
    }

    /// Read the latest slot and append it if it is new to this client.
    ///
    /// Status reads `syncing` for the duration and then follows the stream:
    /// `online` if one is open when the read completes, `offline` otherwise.
    /// Returns the appended message's id, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    pub async fn refresh(&self) -> Result<Option<MessageId>, ClientError> {
        if self.inner.shut_down.load(Ordering::Acquire) {
            return Err(ClientError::Shutdown);
        }

        self.inner.set_status(ConnectionStatus::Syncing);
        let result = self.inner.sender.fetch_latest().await;
        self.inner.end_syncing();

        let latest = result?.message;
        self.inner.mark_synced();

        if latest.is_empty() {
            return Ok(None);
        }
        {
            let mut last_seen = self.inner.last_seen.lock();
            if last_seen.as_deref() == Some(latest.as_str()) {
                return Ok(None);
            }
            *last_seen = Some(latest.clone());
        }

        let mut lifecycle = self.inner.lifecycle.lock();
        let id = lifecycle.append_inbound(latest);
        self.inner.notify(&lifecycle, id);
        debug!(message = %id, "Refreshed");
        Ok(Some(id))
    }

    /// Refresh on a fixed interval until [`shutdown`](Self::shutdown).
    ///
    /// For devices that cannot hold a stream open. Failed refreshes are
    /// logged and retried on the next tick.
    pub async fn poll(&self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.inner.shut_down.load(Ordering::Acquire) {
                return;
            }
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh().await {
                        if matches!(e, ClientError::Shutdown) {
                            return;
                        }
                        warn!(error = %e, "Poll failed");
                    }
                }
                _ = self.inner.shutdown_notify.notified() => return,
            }
        }
    }

    /// Stop streaming and cancel any pending reconnect.
    pub fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.reconnector.cancel();
        if let Some(handle) = self.inner.stream_task.lock().take() {
            handle.abort();
        }
        self.inner.online.store(false, Ordering::Release);
        self.inner.streaming.store(false, Ordering::Release);
        self.inner.set_status(ConnectionStatus::Offline);
        self.inner.shutdown_notify.notify_waiters();
        info!("Client shut down");
    }

    /// Current device state.
    #[must_use]
    pub fn device_state(&self) -> DeviceState {
        self.inner.state.borrow().clone()
    }

    /// Watch device state changes.
    #[must_use]
    pub fn watch_device_state(&self) -> watch::Receiver<DeviceState> {
        self.inner.state.subscribe()
    }

    /// Receive every message as it is added or changes status.
    #[must_use]
    pub fn updates(&self) -> broadcast::Receiver<Message> {
        self.inner.updates.subscribe()
    }

    /// Snapshot of all tracked messages.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.inner.lifecycle.lock().messages().to_vec()
    }

    /// Look up a message.
    #[must_use]
    pub fn message(&self, id: MessageId) -> Option<Message> {
        self.inner.lifecycle.lock().get(id).cloned()
    }

    /// The most recent inbound message.
    #[must_use]
    pub fn latest_inbound(&self) -> Option<Message> {
        self.inner.lifecycle.lock().latest_inbound().cloned()
    }

    /// The most recent outbound message.
    #[must_use]
    pub fn latest_outbound(&self) -> Option<Message> {
        self.inner.lifecycle.lock().latest_outbound().cloned()
    }

    /// Outbound messages still `sending`.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.inner.lifecycle.lock().queued_count()
    }

    /// Reconnection attempts made so far.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.inner.reconnector.attempts()
    }
}

impl fmt::Debug for MessagingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagingClient")
            .field("state", &*self.inner.state.borrow())
            .field("reconnector", &self.inner.reconnector)
            .finish()
    }
}
