//! Fixed-delay reconnection.

use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Delay before a reconnection attempt.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

/// Schedules at most one delayed reconnection attempt at a time.
///
/// A pending attempt can be cancelled, which is what deliberate teardown
/// does. Once an attempt starts running it leaves the slot, so a failure
/// inside the attempt may schedule the next one.
pub struct Reconnector {
    delay: Duration,
    slot: Arc<Mutex<Slot>>,
    attempts: Arc<AtomicU64>,
}

impl Reconnector {
    /// Create a reconnector with the given delay.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            slot: Arc::new(Mutex::new(Slot::default())),
            attempts: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The fixed delay.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Run `attempt` once after the delay.
    ///
    /// Returns `false` without scheduling anything if an attempt is already
    /// pending. Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(&self, attempt: F) -> bool
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock();
        if slot.pending.is_some() {
            debug!("Reconnect already pending");
            return false;
        }

        slot.generation += 1;
        let generation = slot.generation;
        let delay = self.delay;
        let shared = Arc::clone(&self.slot);
        let attempts = Arc::clone(&self.attempts);

        slot.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            {
                let mut slot = shared.lock();
                if slot.generation != generation || slot.pending.is_none() {
                    return;
                }
                // Detach ourselves so the attempt may reschedule.
                slot.pending = None;
            }

            let n = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            info!(attempt = n, "Reconnecting");
            attempt().await;
        }));

        debug!(delay_ms = delay.as_millis() as u64, "Reconnect scheduled");
        true
    }

    /// Cancel the pending attempt, if any.
    pub fn cancel(&self) -> bool {
        let mut slot = self.slot.lock();
        match slot.pending.take() {
            Some(handle) => {
                handle.abort();
                debug!("Reconnect cancelled");
                true
            }
            None => false,
        }
    }

    /// Whether an attempt is waiting for its delay to elapse.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.lock().pending.is_some()
    }

    /// Number of attempts started so far.
    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::Relaxed)
    }
}

impl Default for Reconnector {
    fn default() -> Self {
        Self::new(DEFAULT_RECONNECT_DELAY)
    }
}

impl std::fmt::Debug for Reconnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconnector")
            .field("delay", &self.delay)
            .field("pending", &self.is_pending())
            .field("attempts", &self.attempts())
            .finish()
    }
}

impl Drop for Reconnector {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> std::future::Ready<()> + Clone) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let f = move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        };
        (count, f)
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_once_after_delay() {
        let reconnector = Reconnector::default();
        let (count, attempt) = counter();

        assert!(reconnector.schedule(attempt));
        assert!(reconnector.is_pending());

        tokio::time::advance(Duration::from_millis(4_900)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_millis(200)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!reconnector.is_pending());
        assert_eq!(reconnector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_one_pending() {
        let reconnector = Reconnector::default();
        let (count, attempt) = counter();

        assert!(reconnector.schedule(attempt.clone()));
        assert!(!reconnector.schedule(attempt.clone()));
        assert!(!reconnector.schedule(attempt));

        tokio::time::advance(DEFAULT_RECONNECT_DELAY * 3).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel() {
        let reconnector = Reconnector::default();
        let (count, attempt) = counter();

        reconnector.schedule(attempt.clone());
        assert!(reconnector.cancel());
        assert!(!reconnector.cancel());

        tokio::time::advance(DEFAULT_RECONNECT_DELAY * 2).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);

        // Cancelling frees the slot.
        assert!(reconnector.schedule(attempt));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_may_reschedule() {
        let reconnector = Arc::new(Reconnector::new(Duration::from_secs(1)));
        let count = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&reconnector);
        let c = Arc::clone(&count);
        reconnector.schedule(move || async move {
            c.fetch_add(1, Ordering::SeqCst);
            let c2 = Arc::clone(&c);
            assert!(r.schedule(move || async move {
                c2.fetch_add(1, Ordering::SeqCst);
            }));
        });

        tokio::time::advance(Duration::from_millis(1_100)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(reconnector.is_pending());

        tokio::time::advance(Duration::from_millis(1_100)).await;
        settle().await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
