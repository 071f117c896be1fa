//! Idempotent, cross-thread stop signal
//!
//! One signal is shared by the capture thread, the reporting loop and the
//! Ctrl+C handler. Whoever stops first wins; later calls are no-ops.

use crossbeam_channel::{bounded, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

struct Inner {
    stopped: AtomicBool,
    /// Dropped on stop so every receiver sees a disconnect
    notify_tx: Mutex<Option<Sender<()>>>,
    notify_rx: Receiver<()>,
}

/// Cloneable handle to a shared stop flag
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        let (notify_tx, notify_rx) = bounded(0);
        Self {
            inner: Arc::new(Inner {
                stopped: AtomicBool::new(false),
                notify_tx: Mutex::new(Some(notify_tx)),
                notify_rx,
            }),
        }
    }

    /// Request a stop
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn stop(&self) -> bool {
        if self.inner.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.notify_tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        true
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// A receiver that never yields a message and disconnects on stop
    ///
    /// Meant for `crossbeam_channel::select!` and `recv_timeout` loops.
    #[must_use]
    pub fn receiver(&self) -> Receiver<()> {
        self.inner.notify_rx.clone()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::RecvTimeoutError;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_stop_is_idempotent() {
        let signal = StopSignal::new();
        assert!(!signal.is_stopped());
        assert!(signal.stop());
        assert!(!signal.stop());
        assert!(signal.clone().is_stopped());
    }

    #[test]
    fn test_receiver_disconnects_on_stop() {
        let signal = StopSignal::new();
        let rx = signal.receiver();
        assert_eq!(rx.recv_timeout(Duration::from_millis(10)), Err(RecvTimeoutError::Timeout));

        signal.stop();
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Err(RecvTimeoutError::Disconnected));
    }

    #[test]
    fn test_concurrent_stops_transition_once() {
        let signal = StopSignal::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let signal = signal.clone();
                thread::spawn(move || signal.stop())
            })
            .collect();
        let winners = handles.into_iter().filter_map(|h| h.join().ok()).filter(|won| *won).count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_stop_wakes_waiting_thread() {
        let signal = StopSignal::new();
        let rx = signal.receiver();
        let waiter = thread::spawn(move || rx.recv().is_err());

        thread::sleep(Duration::from_millis(20));
        signal.stop();
        assert!(waiter.join().unwrap());
    }
}
