//! Stop signal shared between an owner and its worker threads.
//!
//! Triggering drops the only sender, so every receiver blocked in `wait`
//! wakes with a disconnect. This doubles as an interruptible sleep for
//! backoff and ticker loops.

use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

#[derive(Clone)]
pub struct StopSignal {
    tx: Arc<Mutex<Option<Sender<()>>>>,
    rx: Receiver<()>,
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("stopped", &self.is_set())
            .finish()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = flume::bounded(1);
        Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            rx,
        }
    }

    /// Request stop. Idempotent.
    pub fn trigger(&self) {
        self.tx.lock().take();
    }

    pub fn is_set(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Sleep for up to `timeout`. Returns `true` if the signal fired.
    pub fn wait(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) => self.is_set(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_times_out_when_not_triggered() {
        let signal = StopSignal::new();
        assert!(!signal.wait(Duration::from_millis(20)));
        assert!(!signal.is_set());
    }

    #[test]
    fn trigger_wakes_waiter_from_another_thread() {
        let signal = StopSignal::new();
        let worker = signal.clone();
        let started = Instant::now();
        let handle = std::thread::spawn(move || worker.wait(Duration::from_secs(10)));
        std::thread::sleep(Duration::from_millis(20));
        signal.trigger();
        assert!(handle.join().unwrap());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn trigger_is_idempotent() {
        let signal = StopSignal::new();
        signal.trigger();
        signal.trigger();
        assert!(signal.is_set());
        assert!(signal.wait(Duration::from_millis(1)));
    }
}
