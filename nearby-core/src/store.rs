//! Content store: local items with per-peer access control, content pushed to us by
//! peers, and the per-peer cache of feed items pulled from them.
//!
//! All state sits behind one `parking_lot::RwLock`. Every operation takes the lock
//! once, so a reader sees an item either entirely present or entirely swept, and a
//! visibility check and the read it guards can never straddle a concurrent sweep.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::config::SyncConfig;
use crate::content::{
    derive_content_id, Access, ContentId, ContentItem, ContentPayload, DetailLevel, FeedItem,
    ReceivedContent,
};
use crate::identity::{now_millis, PeerId};
use crate::protocol::DataShare;

/// Default preview length in characters.
pub const DEFAULT_PREVIEW_LEN: usize = 140;

struct Published {
    item: ContentItem,
    access: Access,
}

#[derive(Default)]
struct StoreState {
    local: HashMap<ContentId, Published>,
    received: HashMap<PeerId, HashMap<ContentId, ReceivedContent>>,
    /// Feed items pulled from each peer, newest first, unique by id.
    feeds: HashMap<PeerId, Vec<FeedItem>>,
}

/// Counts per namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub local: usize,
    pub received: usize,
    pub cached_feed_items: usize,
}

/// Entries removed by a sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub local: usize,
    pub received: usize,
    pub feed_items: usize,
}

impl SweepStats {
    pub fn total(&self) -> usize {
        self.local + self.received + self.feed_items
    }
}

pub struct ContentStore {
    state: RwLock<StoreState>,
    preview_len: usize,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::with_preview_len(DEFAULT_PREVIEW_LEN)
    }

    /// Store using the preview length configured for the manager.
    pub fn from_config(config: &SyncConfig) -> Self {
        Self::with_preview_len(config.preview_len)
    }

    pub fn with_preview_len(preview_len: usize) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            preview_len,
        }
    }

    /// Register an item under `access`. Re-publishing an id replaces item and access in place.
    pub fn publish(&self, item: ContentItem, access: Access) -> ContentId {
        let id = item.id.clone();
        self.state
            .write()
            .local
            .insert(id.clone(), Published { item, access });
        id
    }

    /// Remove a local item. Returns whether it existed.
    pub fn unpublish(&self, id: &ContentId) -> bool {
        self.state.write().local.remove(id).is_some()
    }

    /// True iff `id` exists and its access set admits `peer`. Unknown ids are not visible.
    pub fn is_visible_to(&self, id: &ContentId, peer: &PeerId) -> bool {
        self.state
            .read()
            .local
            .get(id)
            .map(|p| p.access.allows(peer))
            .unwrap_or(false)
    }

    /// Items visible to `peer`, newer than `since`, in `categories` if given, newest first, at most `limit`.
    pub fn feed_for(
        &self,
        peer: &PeerId,
        since: Option<i64>,
        categories: Option<&[String]>,
        limit: usize,
    ) -> Vec<FeedItem> {
        let state = self.state.read();
        let mut visible: Vec<&ContentItem> = state
            .local
            .values()
            .filter(|p| p.access.allows(peer))
            .map(|p| &p.item)
            .filter(|item| since.map_or(true, |s| item.created_at > s))
            .filter(|item| categories.map_or(true, |cats| cats.contains(&item.category)))
            .collect();
        visible.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        visible
            .into_iter()
            .take(limit)
            .map(|item| item.feed_item(self.preview_len))
            .collect()
    }

    /// Local read, no visibility check.
    pub fn fetch(&self, id: &ContentId, level: DetailLevel) -> Result<ContentPayload, StoreError> {
        self.state
            .read()
            .local
            .get(id)
            .map(|p| p.item.payload(level, self.preview_len))
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    /// Read on behalf of `peer`: `AccessDenied` unless the item is visible to it.
    pub fn fetch_for(
        &self,
        peer: &PeerId,
        id: &ContentId,
        level: DetailLevel,
    ) -> Result<ContentPayload, StoreError> {
        let state = self.state.read();
        let published = state
            .local
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        if !published.access.allows(peer) {
            return Err(StoreError::AccessDenied(id.clone()));
        }
        Ok(published.item.payload(level, self.preview_len))
    }

    /// Record content pushed to us. Always accepted; provenance is kept for downstream policy.
    pub fn ingest(&self, peer: &PeerId, share: DataShare) -> ReceivedContent {
        let received_at = now_millis();
        let created_at = share.created_at.unwrap_or(received_at);
        let id = share
            .content_id
            .unwrap_or_else(|| derive_content_id(&share.data_type, created_at, &share.data));
        let received = ReceivedContent {
            id: id.clone(),
            category: share.data_type,
            created_at,
            data: share.data,
            metadata: share.metadata,
            source: peer.clone(),
            received_at,
        };
        self.state
            .write()
            .received
            .entry(peer.clone())
            .or_default()
            .insert(id, received.clone());
        received
    }

    /// Content `peer` pushed to us, newest first.
    pub fn received_from(&self, peer: &PeerId) -> Vec<ReceivedContent> {
        let state = self.state.read();
        let mut out: Vec<ReceivedContent> = state
            .received
            .get(peer)
            .map(|m| m.values().cloned().collect())
            .unwrap_or_default();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        out
    }

    /// Merge feed items pulled from `peer` into its cache. Returns how many ids were new.
    pub fn merge_feed(&self, peer: &PeerId, items: &[FeedItem]) -> usize {
        let mut state = self.state.write();
        let cache = state.feeds.entry(peer.clone()).or_default();
        let mut added = 0;
        for item in items {
            match cache.iter_mut().find(|c| c.id == item.id) {
                Some(existing) => *existing = item.clone(),
                None => {
                    cache.push(item.clone());
                    added += 1;
                }
            }
        }
        cache.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        added
    }

    /// Cached feed of `peer`, newest first.
    pub fn cached_feed(&self, peer: &PeerId) -> Vec<FeedItem> {
        self.state.read().feeds.get(peer).cloned().unwrap_or_default()
    }

    /// Remove every local item, received item and cached feed item with a timestamp before `older_than`.
    pub fn sweep(&self, older_than: i64) -> SweepStats {
        let mut state = self.state.write();
        let mut stats = SweepStats::default();

        let before = state.local.len();
        state.local.retain(|_, p| p.item.created_at >= older_than);
        stats.local = before - state.local.len();

        for items in state.received.values_mut() {
            let before = items.len();
            items.retain(|_, r| r.created_at >= older_than);
            stats.received += before - items.len();
        }
        state.received.retain(|_, items| !items.is_empty());

        for feed in state.feeds.values_mut() {
            let before = feed.len();
            feed.retain(|f| f.timestamp >= older_than);
            stats.feed_items += before - feed.len();
        }
        state.feeds.retain(|_, feed| !feed.is_empty());

        stats
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.state.read();
        StoreStats {
            local: state.local.len(),
            received: state.received.values().map(HashMap::len).sum(),
            cached_feed_items: state.feeds.values().map(Vec::len).sum(),
        }
    }
}

impl Default for ContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("content {0} not found")]
    NotFound(ContentId),
    #[error("content {0} not visible to requester")]
    AccessDenied(ContentId),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn item(id: &str, category: &str, ts: i64) -> ContentItem {
        ContentItem::with_id(id, category, ts, json!({ "id": id }))
    }

    fn peer(name: &str) -> PeerId {
        PeerId::new(name)
    }

    #[test]
    fn configured_preview_len_applies_to_feed_and_fetch() {
        let config = SyncConfig {
            preview_len: 5,
            ..SyncConfig::default()
        };
        let store = ContentStore::from_config(&config);
        store.publish(
            ContentItem::with_id("n1", "note", 1, json!("walked to the lake")),
            Access::All,
        );
        let feed = store.feed_for(&peer("a"), None, None, 10);
        assert_eq!(feed[0].preview, "walke");
        let payload = store.fetch(&ContentId::new("n1"), DetailLevel::Preview).unwrap();
        assert_eq!(payload.preview.as_deref(), Some("walke"));
        assert!(payload.data.is_none());
    }

    #[test]
    fn unknown_id_not_visible() {
        let store = ContentStore::new();
        assert!(!store.is_visible_to(&ContentId::new("missing"), &peer("a")));
    }

    #[test]
    fn allow_list_enforced_in_feed_and_fetch() {
        let store = ContentStore::new();
        store.publish(item("public", "note", 10), Access::All);
        store.publish(item("for-c", "note", 20), Access::peers(["c"]));
        store.publish(item("private", "note", 30), Access::private());

        let a_feed = store.feed_for(&peer("a"), None, None, 10);
        assert_eq!(a_feed.len(), 1);
        assert_eq!(a_feed[0].id, ContentId::new("public"));

        let c_feed = store.feed_for(&peer("c"), None, None, 10);
        let ids: Vec<&str> = c_feed.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["for-c", "public"]);

        assert_eq!(
            store.fetch_for(&peer("a"), &ContentId::new("for-c"), DetailLevel::Full),
            Err(StoreError::AccessDenied(ContentId::new("for-c")))
        );
        assert!(store
            .fetch_for(&peer("c"), &ContentId::new("for-c"), DetailLevel::Full)
            .is_ok());
        assert_eq!(
            store.fetch_for(&peer("c"), &ContentId::new("nope"), DetailLevel::Full),
            Err(StoreError::NotFound(ContentId::new("nope")))
        );
    }

    #[test]
    fn feed_filters_and_truncates() {
        let store = ContentStore::new();
        for (i, cat) in ["steps", "sleep", "steps", "steps"].iter().enumerate() {
            store.publish(item(&format!("i{}", i), cat, 100 + i as i64), Access::All);
        }
        let since = store.feed_for(&peer("a"), Some(101), None, 10);
        assert_eq!(
            since.iter().map(|f| f.timestamp).collect::<Vec<_>>(),
            vec![103, 102]
        );
        let cats = vec!["steps".to_string()];
        let steps = store.feed_for(&peer("a"), None, Some(&cats), 2);
        assert_eq!(
            steps.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            vec!["i3", "i2"]
        );
    }

    #[test]
    fn republish_replaces_without_duplicating() {
        let store = ContentStore::new();
        store.publish(item("x", "note", 10), Access::peers(["a"]));
        let again = item("x", "note", 10).with_metadata("title", "edited");
        let id = store.publish(again, Access::All);
        assert_eq!(id, ContentId::new("x"));
        assert_eq!(store.stats().local, 1);
        assert_eq!(store.feed_for(&peer("b"), None, None, 10).len(), 1);
        let payload = store.fetch(&id, DetailLevel::Metadata).unwrap();
        assert_eq!(payload.metadata.get("title").map(String::as_str), Some("edited"));
    }

    #[test]
    fn ingest_tags_provenance() {
        let store = ContentStore::new();
        let share = DataShare {
            data_type: "location".into(),
            data: json!({"lat": 1}),
            metadata: BTreeMap::new(),
            content_id: Some(ContentId::new("loc-1")),
            created_at: Some(50),
        };
        let received = store.ingest(&peer("b"), share);
        assert_eq!(received.source, peer("b"));
        assert_eq!(received.id, ContentId::new("loc-1"));
        assert_eq!(store.received_from(&peer("b")).len(), 1);
        assert!(store.received_from(&peer("a")).is_empty());
        // Received content never becomes locally shareable.
        assert!(!store.is_visible_to(&ContentId::new("loc-1"), &peer("b")));
    }

    #[test]
    fn merge_feed_dedupes_and_sorts() {
        let store = ContentStore::new();
        let f = |id: &str, ts| FeedItem {
            id: ContentId::new(id),
            category: "note".into(),
            preview: String::new(),
            timestamp: ts,
        };
        assert_eq!(store.merge_feed(&peer("b"), &[f("a", 1), f("b", 3)]), 2);
        assert_eq!(store.merge_feed(&peer("b"), &[f("b", 3), f("c", 2)]), 1);
        let cached = store.cached_feed(&peer("b"));
        assert_eq!(
            cached.iter().map(|f| f.id.as_str()).collect::<Vec<_>>(),
            vec!["b", "c", "a"]
        );
    }

    #[test]
    fn sweep_removes_only_older_entries() {
        let store = ContentStore::new();
        store.publish(item("old", "note", 10), Access::All);
        store.publish(item("new", "note", 1_000), Access::All);
        store.merge_feed(
            &peer("b"),
            &[FeedItem {
                id: ContentId::new("remote-old"),
                category: "note".into(),
                preview: String::new(),
                timestamp: 5,
            }],
        );
        let stats = store.sweep(500);
        assert_eq!(stats.local, 1);
        assert_eq!(stats.feed_items, 1);
        assert!(store.is_visible_to(&ContentId::new("new"), &peer("a")));
        assert!(!store.is_visible_to(&ContentId::new("old"), &peer("a")));
        assert!(store.cached_feed(&peer("b")).is_empty());
    }

    #[test]
    fn sweep_concurrent_with_readers_never_sees_partial_items() {
        let store = Arc::new(ContentStore::new());
        for i in 0..200 {
            store.publish(item(&format!("i{}", i), "note", i), Access::All);
        }
        let reader = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..200 {
                    for f in store.feed_for(&peer("a"), None, None, 500) {
                        // An id listed in a feed is either still fetchable in full or gone entirely.
                        match store.fetch_for(&peer("a"), &f.id, DetailLevel::Full) {
                            Ok(p) => assert!(p.data.is_some()),
                            Err(e) => assert_eq!(e, StoreError::NotFound(f.id.clone())),
                        }
                    }
                }
            })
        };
        for cutoff in (0..200).step_by(10) {
            store.sweep(cutoff);
        }
        reader.join().unwrap();
        assert_eq!(store.stats().local, 10);
    }
}
