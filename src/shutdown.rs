//! Cooperative cancellation.
//!
//! Every worker (pumps, the watcher) and the top-level wait observe the same [`ShutdownToken`].
//! Workers poll it between bounded device waits; the top-level loop blocks on
//! [`ShutdownToken::wait_timeout`] and is woken as soon as anyone triggers it.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct Inner {
    triggered: Mutex<bool>,
    wake: Condvar,
}

/// Shared, clonable shutdown flag.
#[derive(Clone, Debug, Default)]
pub struct ShutdownToken(Arc<Inner>);

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter.
    pub fn trigger(&self) {
        let mut triggered = self
            .0
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *triggered = true;
        self.0.wake.notify_all();
    }

    pub fn is_triggered(&self) -> bool {
        *self
            .0
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for at most `timeout`; returns `true` if shutdown was requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self
            .0
            .triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            triggered = self
                .0
                .wake
                .wait_timeout(triggered, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }

    /// Trigger this token on SIGINT, so a terminal Ctrl+C stops the runtime cleanly.
    ///
    /// A process can install this once; later calls fail.
    pub fn trigger_on_interrupt(&self) -> Result<(), ctrlc::Error> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            log::info!("interrupted, shutting down");
            token.trigger();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let token = ShutdownToken::new();
        assert!(!token.wait_timeout(Duration::from_millis(10)));
        assert!(!token.is_triggered());
    }

    #[test]
    fn test_trigger_wakes_waiter() {
        let token = ShutdownToken::new();
        let waiter = {
            let token = token.clone();
            thread::spawn(move || token.wait_timeout(Duration::from_secs(10)))
        };
        token.trigger();
        assert!(waiter.join().unwrap());
        assert!(token.is_triggered());
    }

    #[test]
    fn test_sigint_triggers_token() {
        let token = ShutdownToken::new();
        token.trigger_on_interrupt().unwrap();
        assert!(token.trigger_on_interrupt().is_err());
        // SAFETY: raising a signal the process now handles.
        unsafe { libc::raise(libc::SIGINT) };
        assert!(token.wait_timeout(Duration::from_secs(5)));
    }
}
