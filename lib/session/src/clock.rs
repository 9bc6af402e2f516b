//! Access-token expiry countdown.
//!
//! The clock counts the remaining validity of the current access token
//! down once per second, publishes each value for display, and fires an
//! expiry callback when it reaches zero. At most one countdown runs at a
//! time: starting a new one retires the previous run before it can
//! decrement again or fire.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

const TICK: Duration = Duration::from_secs(1);

type ExpiryCallback = Arc<dyn Fn() + Send + Sync>;

struct Shared {
    /// Identifies the live run. Bumped on every start, cancel, and expiry.
    generation: AtomicU64,
    task: Mutex<Option<AbortHandle>>,
    on_expire: Mutex<Option<ExpiryCallback>>,
    remaining: watch::Sender<u64>,
}

impl Shared {
    /// Retires `generation` if it is still the live run.
    fn retire(&self, generation: u64) -> bool {
        self.generation
            .compare_exchange(
                generation,
                generation.wrapping_add(1),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    fn abort_task(&self) {
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

/// Countdown of the current access token's remaining seconds.
///
/// Must be started from within a tokio runtime.
pub struct SessionClock {
    shared: Arc<Shared>,
}

impl SessionClock {
    /// Creates an idle clock showing zero seconds.
    #[must_use]
    pub fn new() -> Self {
        let (remaining, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                generation: AtomicU64::new(0),
                task: Mutex::new(None),
                on_expire: Mutex::new(None),
                remaining,
            }),
        }
    }

    /// Starts a countdown from `expiry_seconds`, replacing any running one.
    ///
    /// `on_expire` is kept for later [`restart`](Self::restart) calls and is
    /// invoked exactly once per run that reaches zero. A run started at zero
    /// expires immediately.
    pub fn start<F>(&self, expiry_seconds: u64, on_expire: F) -> CancelHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        let callback: ExpiryCallback = Arc::new(on_expire);
        *self
            .shared
            .on_expire
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&callback));
        self.spawn_run(expiry_seconds, callback)
    }

    /// Starts a fresh countdown with the callback given to the last
    /// [`start`](Self::start).
    ///
    /// Returns `None` if the clock was never started.
    pub fn restart(&self, expiry_seconds: u64) -> Option<CancelHandle> {
        let callback = self
            .shared
            .on_expire
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()?;
        Some(self.spawn_run(expiry_seconds, callback))
    }

    /// Stops the running countdown, if any. Idempotent.
    pub fn cancel(&self) {
        let current = self.shared.generation.load(Ordering::SeqCst);
        if self.shared.retire(current) {
            debug!("session clock cancelled");
        }
        self.shared.abort_task();
    }

    /// Returns the last published remaining-seconds value.
    #[must_use]
    pub fn remaining(&self) -> u64 {
        *self.shared.remaining.borrow()
    }

    /// Subscribes to remaining-seconds updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.remaining.subscribe()
    }

    fn spawn_run(&self, expiry_seconds: u64, on_expire: ExpiryCallback) -> CancelHandle {
        // Retire the old run first so it can neither tick nor fire again.
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.abort_task();
        self.shared.remaining.send_replace(expiry_seconds);

        let task = tokio::spawn(countdown(
            Arc::clone(&self.shared),
            generation,
            expiry_seconds,
            on_expire,
        ));
        *self
            .shared
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task.abort_handle());

        debug!(expiry_seconds, generation, "session clock started");
        CancelHandle {
            shared: Arc::clone(&self.shared),
            generation,
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SessionClock {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn countdown(
    shared: Arc<Shared>,
    generation: u64,
    mut remaining: u64,
    on_expire: ExpiryCallback,
) {
    let mut ticker = interval_at(Instant::now() + TICK, TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    while remaining > 0 {
        ticker.tick().await;
        if shared.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        remaining -= 1;
        shared.remaining.send_replace(remaining);
    }

    if shared.retire(generation) {
        info!("access token expired");
        on_expire();
    }
}

/// Cancels one specific countdown run.
///
/// Cancelling a run that already expired or was replaced does nothing.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<Shared>,
    generation: u64,
}

impl CancelHandle {
    /// Stops the run this handle was issued for. Idempotent.
    pub fn cancel(&self) {
        if self.shared.retire(self.generation) {
            self.shared.abort_task();
        }
    }

    /// Returns true while the run this handle was issued for is still live.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.shared.generation.load(Ordering::SeqCst) == self.generation
    }
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelHandle")
            .field("generation", &self.generation)
            .field("active", &self.is_active())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn() + Send + Sync + 'static) {
        let fired = Arc::new(AtomicUsize::new(0));
        let hook = Arc::clone(&fired);
        (fired, move || {
            hook.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test(start_paused = true)]
    async fn counts_down_and_fires_once() {
        let clock = SessionClock::new();
        let mut updates = clock.subscribe();
        let (fired, on_expire) = counter();

        let handle = clock.start(5, on_expire);
        assert_eq!(clock.remaining(), 5);

        let mut seen = Vec::new();
        while updates.changed().await.is_ok() {
            let value = *updates.borrow_and_update();
            seen.push(value);
            if value == 0 {
                break;
            }
        }

        assert!(seen.windows(2).all(|w| w[0] > w[1]), "not decreasing: {seen:?}");
        assert_eq!(seen.last(), Some(&0));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(clock.remaining(), 0);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_fire_before_zero() {
        let clock = SessionClock::new();
        let (fired, on_expire) = counter();
        let _handle = clock.start(5, on_expire);

        tokio::time::sleep(Duration::from_millis(4_500)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(clock.remaining(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_expiry_fires_immediately() {
        let clock = SessionClock::new();
        let (fired, on_expire) = counter();
        let _handle = clock.start(0, on_expire);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(clock.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_running_countdown() {
        let clock = SessionClock::new();
        let (fired, on_expire) = counter();
        let first = clock.start(3, on_expire);

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(clock.remaining(), 1);

        let second = clock.restart(10).expect("clock was started");
        assert!(!first.is_active());
        assert!(second.is_active());
        assert_eq!(clock.remaining(), 10);

        // The first run would have expired here.
        tokio::time::sleep(Duration::from_millis(2_200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(clock.remaining(), 8);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(clock.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent_and_prevents_expiry() {
        let clock = SessionClock::new();
        let (fired, on_expire) = counter();
        let handle = clock.start(2, on_expire);

        handle.cancel();
        handle.cancel();
        clock.cancel();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(clock.remaining(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_handle_does_not_cancel_newer_run() {
        let clock = SessionClock::new();
        let (fired, on_expire) = counter();
        let stale = clock.start(5, on_expire);
        let _current = clock.restart(2).expect("clock was started");

        stale.cancel();

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn restart_without_start_is_none() {
        let clock = SessionClock::new();
        assert!(clock.restart(10).is_none());
    }
}
