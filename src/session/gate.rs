//! One-shot readiness latch for the capture thread.

use std::sync::{Condvar, Mutex};

/// Blocks audio capture until the transcription connection is confirmed open.
///
/// `signal` is idempotent; `wait` returns immediately once signaled.
#[derive(Default)]
pub struct ReadyGate {
    ready: Mutex<bool>,
    cond: Condvar,
}

impl ReadyGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark ready. Safe to call more than once.
    pub fn signal(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        *ready = true;
        self.cond.notify_all();
    }

    /// Block the calling thread until `signal` has been called.
    pub fn wait(&self) {
        let mut ready = self.ready.lock().unwrap_or_else(|e| e.into_inner());
        while !*ready {
            ready = self.cond.wait(ready).unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Non-blocking readiness check.
    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_starts_not_ready() {
        let gate = ReadyGate::new();
        assert!(!gate.is_ready());
    }

    #[test]
    fn test_wait_returns_immediately_after_signal() {
        let gate = ReadyGate::new();
        gate.signal();
        gate.wait();
        gate.wait(); // subsequent waits return immediately too
        assert!(gate.is_ready());
    }

    #[test]
    fn test_signal_is_idempotent() {
        let gate = ReadyGate::new();
        gate.signal();
        gate.signal();
        assert!(gate.is_ready());
    }

    #[test]
    fn test_wait_blocks_until_signaled_from_another_thread() {
        let gate = Arc::new(ReadyGate::new());

        let waiter = {
            let gate = gate.clone();
            thread::spawn(move || {
                gate.wait();
                true
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!waiter.is_finished());

        gate.signal();
        assert!(waiter.join().unwrap());
    }
}
