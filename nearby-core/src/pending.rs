//! Outstanding requests keyed by message id, each with a single-resolution slot.
//!
//! Removal from the table is the only way to resolve or expire an entry, and it
//! happens under the table lock, so whichever path removes the entry first (the
//! response or the timeout) owns the outcome and the other becomes a no-op.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::identity::{MessageId, PeerId};
use crate::protocol::Message;

struct Entry {
    peer: PeerId,
    created: Instant,
    slot: oneshot::Sender<Message>,
}

#[derive(Default)]
pub(crate) struct PendingRequests {
    entries: Mutex<HashMap<MessageId, Entry>>,
}

/// Why a pending request ended without a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Unresolved {
    TimedOut,
    /// Entry dropped without a response (peer disconnected).
    Abandoned,
}

impl PendingRequests {
    /// Register a request sent to `peer`. The returned slot removes the entry when dropped.
    pub(crate) fn register(&self, id: MessageId, peer: PeerId) -> PendingSlot<'_> {
        let (tx, rx) = oneshot::channel();
        self.entries.lock().insert(
            id.clone(),
            Entry {
                peer,
                created: Instant::now(),
                slot: tx,
            },
        );
        PendingSlot {
            table: self,
            id,
            rx,
        }
    }

    /// Deliver `msg` to the request with the same id, if one is pending for `from`.
    /// A matching id from a different peer is left untouched. Returns true once the
    /// entry is claimed, even if its caller already stopped waiting.
    pub(crate) fn resolve(&self, from: &PeerId, msg: Message) -> bool {
        let entry = {
            let mut entries = self.entries.lock();
            match entries.get(&msg.id) {
                Some(e) if e.peer == *from => entries.remove(&msg.id),
                _ => None,
            }
        };
        match entry {
            Some(e) => {
                tracing::debug!(id = %msg.id, peer = %from, elapsed = ?e.created.elapsed(), "response correlated");
                if e.slot.send(msg).is_err() {
                    tracing::debug!(peer = %from, "caller stopped waiting; response discarded");
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&self, id: &MessageId) -> bool {
        self.entries.lock().remove(id).is_some()
    }

    /// Drop every request addressed to `peer`. Their callers see `Abandoned`.
    pub(crate) fn abandon_peer(&self, peer: &PeerId) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.peer != *peer);
        before - entries.len()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

pub(crate) struct PendingSlot<'a> {
    table: &'a PendingRequests,
    id: MessageId,
    rx: oneshot::Receiver<Message>,
}

impl PendingSlot<'_> {
    pub(crate) fn id(&self) -> &MessageId {
        &self.id
    }

    /// Wait for the correlated response for at most `timeout`.
    pub(crate) async fn wait(mut self, timeout: Duration) -> Result<Message, Unresolved> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(_)) => Err(Unresolved::Abandoned),
            Err(_) => {
                if self.table.remove(&self.id) {
                    Err(Unresolved::TimedOut)
                } else {
                    // A response won the race after the deadline; it is already in the slot.
                    self.rx.try_recv().map_err(|_| Unresolved::Abandoned)
                }
            }
        }
    }
}

impl Drop for PendingSlot<'_> {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}
