//! Challenge timers
//!
//! One tokio task per pending record. The task sleeps for the remainder of
//! the challenge window and then invokes the expiry callback, which routes
//! back into the gate. The timer never touches the registry itself.

use joinguard_common::VerificationKey;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

/// Cancellable handle to a scheduled expiry
#[derive(Debug)]
pub struct TimerHandle {
    key: VerificationKey,
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn key(&self) -> VerificationKey {
        self.key
    }

    /// Cancel the expiry. Safe to call after the timer already fired.
    pub fn cancel(self) {
        trace!(key = %self.key, "cancelling challenge timer");
        self.abort.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.abort.is_finished()
    }
}

/// Spawns and tracks challenge expiry tasks
#[derive(Debug, Clone, Default)]
pub struct ChallengeTimer {
    live: Arc<AtomicUsize>,
}

/// Decrements the live count however the task ends, abort included
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ChallengeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `on_expiry(key)` to run after `fire_in`
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule<F, Fut>(
        &self,
        key: VerificationKey,
        fire_in: Duration,
        on_expiry: F,
    ) -> TimerHandle
    where
        F: FnOnce(VerificationKey) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.live.fetch_add(1, Ordering::AcqRel);
        let guard = LiveGuard(self.live.clone());

        debug!(key = %key, fire_in_secs = fire_in.as_secs(), "scheduling challenge timer");
        let task = tokio::spawn(async move {
            let _guard = guard;
            tokio::time::sleep(fire_in).await;
            debug!(key = %key, "challenge timer fired");
            on_expiry(key).await;
        });

        TimerHandle {
            key,
            abort: task.abort_handle(),
        }
    }

    /// Number of timers that have neither completed nor been cancelled
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let timer = ChallengeTimer::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let key = VerificationKey::new(1, 2);
        let _handle = timer.schedule(key, Duration::from_secs(300), move |_| async move {
            flag.store(true, Ordering::SeqCst);
        });
        assert_eq!(timer.live(), 1);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert!(!fired.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.load(Ordering::SeqCst));
        assert_eq!(timer.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let timer = ChallengeTimer::new();
        let fired = Arc::new(AtomicBool::new(false));
        let flag = fired.clone();

        let key = VerificationKey::new(1, 2);
        let handle = timer.schedule(key, Duration::from_secs(10), move |_| async move {
            flag.store(true, Ordering::SeqCst);
        });
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert_eq!(timer.live(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_fire_is_harmless() {
        let timer = ChallengeTimer::new();
        let handle =
            timer.schedule(VerificationKey::new(3, 4), Duration::from_secs(1), |_| async {});

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(handle.is_finished());
        assert_eq!(handle.key(), VerificationKey::new(3, 4));
        handle.cancel();
        assert_eq!(timer.live(), 0);
    }
}
