//! Cooperative stop signal for user-initiated interrupts.
//!
//! Every wait in the sweep goes through [`StopSignal::sleep`], so an
//! interrupt is observed at the next suspension point instead of after a
//! full settle delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

/// How a [`StopSignal::sleep`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Elapsed,
    Stopped,
}

#[derive(Debug, Default)]
struct Inner {
    stopped: AtomicBool,
    notify: Notify,
}

/// Cloneable handle; all clones observe the same trigger.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Idempotent.
    pub fn trigger(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless the signal fires first.
    pub async fn sleep(&self, duration: Duration) -> Wake {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a trigger in between is not lost.
        notified.as_mut().enable();

        if self.is_triggered() {
            return Wake::Stopped;
        }
        if duration.is_zero() {
            return Wake::Elapsed;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => Wake::Elapsed,
            _ = notified => Wake::Stopped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_sleep_elapses_immediately() {
        let s = StopSignal::new();
        assert_eq!(s.sleep(Duration::ZERO).await, Wake::Elapsed);
    }

    #[tokio::test]
    async fn test_triggered_signal_short_circuits_sleep() {
        let s = StopSignal::new();
        s.trigger();
        assert_eq!(s.sleep(Duration::from_secs(3600)).await, Wake::Stopped);
    }

    #[tokio::test]
    async fn test_trigger_from_clone_wakes_sleeper() {
        let s = StopSignal::new();
        let other = s.clone();
        let sleeper = tokio::spawn(async move { s.sleep(Duration::from_secs(3600)).await });
        tokio::task::yield_now().await;
        other.trigger();
        let wake = tokio::time::timeout(Duration::from_secs(5), sleeper)
            .await
            .expect("sleeper should wake")
            .expect("task should not panic");
        assert_eq!(wake, Wake::Stopped);
    }

    #[test]
    fn test_trigger_is_sticky() {
        let s = StopSignal::new();
        assert!(!s.is_triggered());
        s.trigger();
        s.trigger();
        assert!(s.is_triggered());
        let rt = tokio_test::block_on(s.sleep(Duration::from_millis(1)));
        assert_eq!(rt, Wake::Stopped);
    }
}
