//! Cooperative cancellation shared between the export loop and `stop_and_clean`

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Signal {
    cancelled: Mutex<bool>,
    changed: Condvar,
}

/// One-way exit flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Signal>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.inner.cancelled.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the flag and wake every waiter
    pub fn cancel(&self) {
        *self.lock() = true;
        self.inner.changed.notify_all();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.lock()
    }

    /// Block until cancelled
    pub fn wait(&self) {
        let mut cancelled = self.lock();
        while !*cancelled {
            cancelled = self.inner.changed.wait(cancelled).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until cancelled or `timeout` elapses. Returns whether cancelled.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let guard = self.lock();
        let (cancelled, _) = self
            .inner
            .changed
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_cancel_is_sticky() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn test_wait_wakes_on_cancel() {
        let token = CancellationToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || token.wait())
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        waiter.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let token = CancellationToken::new();
        let start = Instant::now();
        assert!(!token.wait_timeout(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));

        token.cancel();
        assert!(token.wait_timeout(Duration::from_secs(5)));
    }
}
