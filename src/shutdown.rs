//! Cooperative shutdown signal shared by the polling threads
//!
//! Pollers sleep through [`ShutdownSignal::wait_timeout`] instead of
//! `thread::sleep`, so a close wakes every waiter immediately.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    triggered: Mutex<bool>,
    cond: Condvar,
}

/// Cloneable one-shot stop flag with wakeable sleeps
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    inner: Arc<Inner>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal. Returns `false` if it was already triggered.
    pub fn trigger(&self) -> bool {
        let mut triggered = self
            .inner
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *triggered {
            return false;
        }
        *triggered = true;
        self.inner.cond.notify_all();
        true
    }

    pub fn is_triggered(&self) -> bool {
        *self
            .inner
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Sleep for `timeout` or until triggered. Returns `true` if triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self
            .inner
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .inner
                .cond
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            triggered = guard;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let signal = ShutdownSignal::new();
        let waiter = signal.clone();

        let handle = thread::spawn(move || {
            let start = Instant::now();
            let triggered = waiter.wait_timeout(Duration::from_secs(10));
            (triggered, start.elapsed())
        });

        thread::sleep(Duration::from_millis(20));
        assert!(signal.trigger());
        assert!(!signal.trigger());

        let (triggered, elapsed) = handle.join().unwrap();
        assert!(triggered);
        assert!(elapsed < Duration::from_secs(5));
    }
}
