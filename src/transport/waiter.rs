//! One-shot request/response waiters and the persistent-handler registry
//! they take precedence over (spec §3, §4.2).

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::{Error, FieldResult};

/// A registered one-shot future for the next packet of some opcode. Created
/// by [`WaiterQueue::register`], resolved or cancelled exactly once.
pub struct Waiter {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Waiter {
    /// Blocks until a matching packet arrives or `deadline` elapses.
    pub fn wait(self, deadline: Duration) -> FieldResult<Vec<u8>> {
        match self.rx.recv_timeout(deadline) {
            Ok(bytes) => Ok(bytes),
            Err(RecvTimeoutError::Timeout) => Err(Error::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionClosed),
        }
    }
}

/// FIFO of pending one-shot waiters for a single opcode. Enqueue order is
/// resolution order (spec §8 property 3).
#[derive(Default)]
pub struct WaiterQueue {
    pending: Mutex<VecDeque<SyncSender<Vec<u8>>>>,
}

impl WaiterQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self) -> Waiter {
        let (tx, rx) = mpsc::sync_channel(1);
        self.pending.lock().unwrap().push_back(tx);
        Waiter { rx }
    }

    /// Pops the oldest pending waiter and tries to resolve it with `bytes`.
    /// Returns `true` iff a waiter both existed and was still live (its
    /// `Waiter` hasn't been dropped, e.g. by an earlier timeout). Only the
    /// single oldest entry is tried — a dead waiter does not fall through
    /// to the next one, matching the dispatch precedence in spec §4.2: a
    /// non-empty queue claims the packet regardless.
    pub fn resolve(&self, bytes: &[u8]) -> bool {
        let popped = self.pending.lock().unwrap().pop_front();
        match popped {
            Some(tx) => tx.send(bytes.to_vec()).is_ok(),
            None => false,
        }
    }

    /// Drops every pending sender, cancelling their waiters. A dropped
    /// `Waiter` observes `Error::ConnectionClosed` the next time it's
    /// awaited.
    pub fn cancel_all(&self) {
        self.pending.lock().unwrap().clear();
    }
}

/// A persistent per-opcode callback, installed with `Transport::on` and
/// invoked for every packet of that opcode a waiter didn't already claim.
pub type Handler = Arc<dyn Fn(&[u8]) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_resolves_in_registration_order() {
        let queue = WaiterQueue::new();
        let w1 = queue.register();
        let w2 = queue.register();

        assert!(queue.resolve(b"first"));
        assert!(queue.resolve(b"second"));

        assert_eq!(w1.wait(Duration::from_millis(10)).unwrap(), b"first");
        assert_eq!(w2.wait(Duration::from_millis(10)).unwrap(), b"second");
    }

    #[test]
    fn resolve_on_empty_queue_returns_false() {
        let queue = WaiterQueue::new();
        assert!(!queue.resolve(b"unclaimed"));
    }

    #[test]
    fn timeout_without_resolution() {
        let queue = WaiterQueue::new();
        let waiter = queue.register();
        assert!(matches!(
            waiter.wait(Duration::from_millis(20)),
            Err(Error::Timeout)
        ));
    }

    #[test]
    fn cancel_all_disconnects_pending_waiters() {
        let queue = WaiterQueue::new();
        let waiter = queue.register();
        queue.cancel_all();
        assert!(matches!(
            waiter.wait(Duration::from_millis(20)),
            Err(Error::ConnectionClosed)
        ));
    }
}
