//! Hand-off of received snapshots from the network thread
//!
//! The receive path only pushes immutable snapshots into a short critical
//! section; the physics step drains them before stepping the buffers, so no
//! body list is ever touched outside the fixed step.

use bodysync_core::{Snapshot, SourceId};
use parking_lot::Mutex;
use std::sync::Arc;

type Queue = Arc<Mutex<Vec<(SourceId, Snapshot)>>>;

/// Receiving end, owned by the snapshot manager
#[derive(Debug, Default)]
pub(crate) struct SnapshotInbox {
    queue: Queue,
}

impl SnapshotInbox {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Create a sender feeding this inbox
    pub(crate) fn sender(&self) -> SnapshotSender {
        SnapshotSender {
            queue: Arc::clone(&self.queue),
        }
    }

    /// Take every queued snapshot, in arrival order
    pub(crate) fn drain(&self) -> Vec<(SourceId, Snapshot)> {
        std::mem::take(&mut *self.queue.lock())
    }
}

/// Cloneable handle for queuing snapshots from any thread
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    queue: Queue,
}

impl SnapshotSender {
    /// Queue a snapshot received from `source`
    pub fn send(&self, source: SourceId, snapshot: Snapshot) {
        self.queue.lock().push((source, snapshot));
    }

    /// Number of snapshots waiting for the next step
    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_and_drain() {
        let inbox = SnapshotInbox::new();
        let sender = inbox.sender();
        sender.send(SourceId::new(1), Snapshot::at(0.0, Vec::new()));
        sender.clone().send(SourceId::new(2), Snapshot::at(0.1, Vec::new()));

        assert_eq!(sender.queued(), 2);
        let drained = inbox.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].0, SourceId::new(1));
        assert_eq!(sender.queued(), 0);
    }

    #[test]
    fn test_sender_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SnapshotSender>();
    }
}
