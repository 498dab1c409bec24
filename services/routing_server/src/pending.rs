//! In-flight correlation table.
//!
//! Maps each correlation id to the one-shot completion slot its worker is
//! waiting on. One mutex guards the whole table; every operation under it
//! is a hash-map touch, so the critical sections stay tiny.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Correlation table plus the id allocator.
///
/// Ids come from a process-local atomic counter, so they are strictly
/// increasing and never collide within a process lifetime. A slot is
/// completed at most once: completion consumes the sender, and a late
/// completion for an already-removed id is reported as `false` and
/// otherwise ignored.
#[derive(Debug)]
pub struct PendingTable {
    slots: Mutex<HashMap<u64, oneshot::Sender<String>>>,
    next_corr_id: AtomicU64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_corr_id: AtomicU64::new(1),
        }
    }

    /// Arm a fresh slot under a newly allocated correlation id.
    pub fn insert(&self) -> (u64, oneshot::Receiver<String>) {
        let corr_id = self.next_corr_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.slots.lock().insert(corr_id, tx);
        (corr_id, rx)
    }

    /// Arm a fresh slot unless the table already holds `ceiling` entries.
    ///
    /// The length check and the insert share one critical section, so
    /// concurrent readers racing on separate connections cannot all pass
    /// the check and collectively push the table past the ceiling: growth
    /// through this path is capped at `ceiling` no matter how many
    /// connections insert at once.
    pub fn try_insert(&self, ceiling: usize) -> Option<(u64, oneshot::Receiver<String>)> {
        let mut slots = self.slots.lock();
        if slots.len() >= ceiling {
            return None;
        }
        let corr_id = self.next_corr_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        slots.insert(corr_id, tx);
        Some((corr_id, rx))
    }

    /// Remove the slot and deliver the payload to its waiter.
    ///
    /// Returns `false` when no slot is armed under the id (already timed
    /// out, duplicate response) or the waiter is gone.
    pub fn complete(&self, corr_id: u64, payload: String) -> bool {
        let Some(tx) = self.slots.lock().remove(&corr_id) else {
            return false;
        };
        tx.send(payload).is_ok()
    }

    /// Drop the slot without delivering anything (timeout and send-failure
    /// paths, where the waiter answers the client itself).
    pub fn remove(&self, corr_id: u64) -> bool {
        self.slots.lock().remove(&corr_id).is_some()
    }

    /// In-flight count; drives the backpressure ceiling.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complete every armed slot with the same payload. Shutdown path.
    pub fn drain(&self, payload: &str) -> usize {
        let drained: Vec<_> = {
            let mut slots = self.slots.lock();
            slots.drain().collect()
        };
        let count = drained.len();
        for (_, tx) in drained {
            let _ = tx.send(payload.to_string());
        }
        count
    }
}
