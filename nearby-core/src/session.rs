//! Ephemeral per-peer session bookkeeping. Never persisted.
//!
//! Sessions exist only between the transport's connect and disconnect reports for a
//! peer, so a session's presence in the table is its online flag.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::identity::{now_millis, PeerId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSession {
    pub peer: PeerId,
    pub last_seen: i64,
    /// Local time of the last successful feed pull.
    pub last_feed_sync: Option<i64>,
    /// Newest item timestamp received from this peer; lower bound for the next incremental pull.
    pub feed_cursor: Option<i64>,
}

impl PeerSession {
    fn new(peer: PeerId, now: i64) -> Self {
        Self {
            peer,
            last_seen: now,
            last_feed_sync: None,
            feed_cursor: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct SessionTable {
    sessions: Mutex<HashMap<PeerId, PeerSession>>,
}

impl SessionTable {
    /// Open a session for `peer`, or refresh it if already open. Returns true if the session is new.
    pub(crate) fn open(&self, peer: &PeerId) -> bool {
        let now = now_millis();
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(peer) {
            Some(s) => {
                s.last_seen = now;
                false
            }
            None => {
                sessions.insert(peer.clone(), PeerSession::new(peer.clone(), now));
                true
            }
        }
    }

    /// Mark an open session seen now. Unknown peers are left alone; returns whether one was open.
    pub(crate) fn touch(&self, peer: &PeerId) -> bool {
        match self.sessions.lock().get_mut(peer) {
            Some(s) => {
                s.last_seen = now_millis();
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&self, peer: &PeerId) -> Option<PeerSession> {
        self.sessions.lock().remove(peer)
    }

    /// Record a successful pull on an open session. `newest_item` advances the cursor,
    /// which only moves forward; pass `None` for pulls that must not move it.
    pub(crate) fn record_sync(&self, peer: &PeerId, newest_item: Option<i64>) {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get_mut(peer) else {
            return;
        };
        session.last_feed_sync = Some(now_millis());
        if let Some(ts) = newest_item {
            session.feed_cursor = Some(session.feed_cursor.map_or(ts, |c| c.max(ts)));
        }
    }

    pub(crate) fn feed_cursor(&self, peer: &PeerId) -> Option<i64> {
        self.sessions.lock().get(peer).and_then(|s| s.feed_cursor)
    }

    pub(crate) fn get(&self, peer: &PeerId) -> Option<PeerSession> {
        self.sessions.lock().get(peer).cloned()
    }

    pub(crate) fn snapshot(&self) -> Vec<PeerSession> {
        let mut out: Vec<PeerSession> = self.sessions.lock().values().cloned().collect();
        out.sort_by(|a, b| a.peer.cmp(&b.peer));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_once() {
        let table = SessionTable::default();
        let p = PeerId::new("b");
        assert!(table.open(&p));
        assert!(!table.open(&p));
        assert_eq!(table.snapshot().len(), 1);
        assert!(table.remove(&p).is_some());
        assert!(table.open(&p));
    }

    #[test]
    fn touch_never_creates() {
        let table = SessionTable::default();
        let p = PeerId::new("b");
        assert!(!table.touch(&p));
        assert!(table.get(&p).is_none());
        table.open(&p);
        assert!(table.touch(&p));
        table.remove(&p);
        assert!(!table.touch(&p));
        assert!(table.snapshot().is_empty());
    }

    #[test]
    fn cursor_only_moves_forward() {
        let table = SessionTable::default();
        let p = PeerId::new("b");
        table.open(&p);
        assert_eq!(table.feed_cursor(&p), None);
        table.record_sync(&p, Some(100));
        table.record_sync(&p, Some(50));
        table.record_sync(&p, None);
        assert_eq!(table.feed_cursor(&p), Some(100));
        assert!(table.get(&p).unwrap().last_feed_sync.is_some());
    }

    #[test]
    fn sync_on_closed_session_is_ignored() {
        let table = SessionTable::default();
        let p = PeerId::new("b");
        table.record_sync(&p, Some(100));
        assert!(table.get(&p).is_none());
    }
}
