//! Shareable content: items, access sets, feed descriptors, detail-trimmed payloads.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::identity::{now_millis, PeerId};

/// Content identifier. Local items get a digest-derived id unless the caller supplies one.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        ContentId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContentId {
    fn from(s: &str) -> Self {
        ContentId(s.to_string())
    }
}

/// Derive a content id: first 16 bytes of SHA-256 over category, creation time and payload, hex.
pub fn derive_content_id(category: &str, created_at: i64, data: &Value) -> ContentId {
    let mut hasher = Sha256::new();
    hasher.update(category.as_bytes());
    hasher.update([0u8]);
    hasher.update(created_at.to_le_bytes());
    hasher.update(data.to_string().as_bytes());
    let digest = hasher.finalize();
    ContentId(digest[..16].iter().map(|b| format!("{:02x}", b)).collect())
}

/// Who may see an item. The default is an empty allow-list: nobody.
/// An item is public only when published with `Access::All`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    All,
    Peers(BTreeSet<PeerId>),
}

impl Access {
    pub fn private() -> Self {
        Access::Peers(BTreeSet::new())
    }

    pub fn peers<I, P>(peers: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PeerId>,
    {
        Access::Peers(peers.into_iter().map(Into::into).collect())
    }

    pub fn allows(&self, peer: &PeerId) -> bool {
        match self {
            Access::All => true,
            Access::Peers(set) => set.contains(peer),
        }
    }
}

impl Default for Access {
    fn default() -> Self {
        Access::private()
    }
}

/// How much of an item a CONTENT_REQUEST asks for. Visibility is the same at every level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailLevel {
    /// Category, timestamps and size only.
    Metadata,
    /// Metadata plus preview text.
    Preview,
    /// Everything, including the raw data.
    Full,
}

/// Locally produced unit of shareable data. Immutable once published.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: ContentId,
    pub category: String,
    pub created_at: i64,
    pub data: Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl ContentItem {
    /// New item stamped with the current time and a digest-derived id.
    pub fn new(category: impl Into<String>, data: Value) -> Self {
        let category = category.into();
        let created_at = now_millis();
        let id = derive_content_id(&category, created_at, &data);
        Self {
            id,
            category,
            created_at,
            data,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_id(
        id: impl Into<ContentId>,
        category: impl Into<String>,
        created_at: i64,
        data: Value,
    ) -> Self {
        Self {
            id: id.into(),
            category: category.into(),
            created_at,
            data,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Preview text: the string itself for string data, compact JSON otherwise, cut to `max_chars`.
    pub fn preview(&self, max_chars: usize) -> String {
        preview_text(&self.data, max_chars)
    }

    /// Size of the serialized data in bytes.
    pub fn size(&self) -> u64 {
        self.data.to_string().len() as u64
    }

    pub fn feed_item(&self, preview_len: usize) -> FeedItem {
        FeedItem {
            id: self.id.clone(),
            category: self.category.clone(),
            preview: self.preview(preview_len),
            timestamp: self.created_at,
        }
    }

    /// Payload trimmed to `level`.
    pub fn payload(&self, level: DetailLevel, preview_len: usize) -> ContentPayload {
        let (preview, data) = match level {
            DetailLevel::Metadata => (None, None),
            DetailLevel::Preview => (Some(self.preview(preview_len)), None),
            DetailLevel::Full => (Some(self.preview(preview_len)), Some(self.data.clone())),
        };
        ContentPayload {
            content_id: self.id.clone(),
            category: self.category.clone(),
            created_at: self.created_at,
            size: self.size(),
            preview,
            data,
            metadata: self.metadata.clone(),
        }
    }
}

impl From<String> for ContentId {
    fn from(s: String) -> Self {
        ContentId(s)
    }
}

fn preview_text(data: &Value, max_chars: usize) -> String {
    let text = match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if text.chars().count() <= max_chars {
        text
    } else {
        text.chars().take(max_chars).collect()
    }
}

/// Peer-visible descriptor of a content item, used for discovery before a full fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedItem {
    pub id: ContentId,
    pub category: String,
    pub preview: String,
    pub timestamp: i64,
}

/// Body of a CONTENT_RESPONSE. `preview` and `data` are present depending on the detail level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentPayload {
    pub content_id: ContentId,
    pub category: String,
    pub created_at: i64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

/// Content a peer pushed to us, kept apart from local items with its provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedContent {
    pub id: ContentId,
    pub category: String,
    pub created_at: i64,
    pub data: Value,
    pub metadata: BTreeMap<String, String>,
    pub source: PeerId,
    pub received_at: i64,
}
