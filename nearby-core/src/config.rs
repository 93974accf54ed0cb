//! Tunables for the network manager.

use std::time::Duration;

use crate::store::DEFAULT_PREVIEW_LEN;

/// Default per-request deadline. Seconds, not minutes: a stalled peer must not hold callers.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_FEED_PULL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_FEED_LIMIT: u32 = 50;
pub const MAX_FEED_LIMIT: u32 = 200;
/// Content older than this is swept by the sync loop (7 days).
pub const DEFAULT_CONTENT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub request_timeout: Duration,
    pub feed_pull_interval: Duration,
    /// Limit used by periodic pulls and by requests that ask for 0 items.
    pub default_feed_limit: u32,
    /// Upper bound on items returned to one FEED_REQUEST.
    pub max_feed_limit: u32,
    pub preview_len: usize,
    pub content_max_age: Duration,
    /// Buffered events per subscriber before slow subscribers start lagging.
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            feed_pull_interval: DEFAULT_FEED_PULL_INTERVAL,
            default_feed_limit: DEFAULT_FEED_LIMIT,
            max_feed_limit: MAX_FEED_LIMIT,
            preview_len: DEFAULT_PREVIEW_LEN,
            content_max_age: DEFAULT_CONTENT_MAX_AGE,
            event_capacity: 256,
        }
    }
}

impl SyncConfig {
    /// Effective item count for a FEED_REQUEST asking for `requested`.
    pub fn clamp_feed_limit(&self, requested: u32) -> usize {
        let limit = if requested == 0 {
            self.default_feed_limit
        } else {
            requested
        };
        limit.min(self.max_feed_limit) as usize
    }
}
