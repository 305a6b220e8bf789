use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// One-shot shutdown flag with a cancellable timed wait.
///
/// The supervisor sleeps its reconnect backoff on [`ShutdownSignal::wait_timeout`]
/// so that shutting the bridge down never waits out a full backoff.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: Mutex<bool>,
    cond: Condvar,
}

impl ShutdownSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger the signal and wake every waiter. Idempotent.
    pub fn trigger(&self) {
        let mut triggered = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        *triggered = true;
        self.cond.notify_all();
    }

    /// Whether the signal has been triggered.
    pub fn is_triggered(&self) -> bool {
        *self.triggered.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait up to `timeout` for the signal.
    ///
    /// Returns `true` if the signal was triggered, `false` if the full timeout
    /// elapsed first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut triggered = self.triggered.lock().unwrap_or_else(PoisonError::into_inner);
        while !*triggered {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
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
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn wait_times_out_when_not_triggered() {
        let signal = ShutdownSignal::new();
        let start = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
        assert!(!signal.is_triggered());
    }

    #[test]
    fn trigger_wakes_waiter_early() {
        let signal = Arc::new(ShutdownSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let start = Instant::now();
                let triggered = signal.wait_timeout(Duration::from_secs(10));
                (triggered, start.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(20));
        signal.trigger();

        let (triggered, elapsed) = waiter.join().unwrap();
        assert!(triggered);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn already_triggered_returns_immediately() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_triggered());
        assert!(signal.wait_timeout(Duration::from_secs(10)));
    }
}
