//! Load config from file and environment.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use nearby_core::SyncConfig;

/// Daemon configuration. File: ~/.config/nearby/config.toml or /etc/nearby/config.toml.
/// Env overrides: NEARBY_PEER_NAME, NEARBY_DISCOVERY_PORT, NEARBY_TRANSPORT_PORT,
/// NEARBY_REQUEST_TIMEOUT_SECS, NEARBY_FEED_PULL_SECS.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Name announced to peers. Generated per run when unset.
    #[serde(default)]
    pub peer_name: Option<String>,
    /// Discovery UDP port (default 45678).
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// Local transport TCP port (default 45679).
    #[serde(default = "default_transport_port")]
    pub transport_port: u16,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_feed_pull_secs")]
    pub feed_pull_secs: u64,
    /// Items asked for per periodic pull.
    #[serde(default = "default_feed_limit")]
    pub feed_limit: u32,
    /// Characters of preview text served in feeds.
    #[serde(default = "default_preview_len")]
    pub preview_len: usize,
}

fn default_discovery_port() -> u16 {
    45678
}
fn default_transport_port() -> u16 {
    45679
}
fn default_request_timeout_secs() -> u64 {
    nearby_core::config::DEFAULT_REQUEST_TIMEOUT.as_secs()
}
fn default_feed_pull_secs() -> u64 {
    nearby_core::config::DEFAULT_FEED_PULL_INTERVAL.as_secs()
}
fn default_feed_limit() -> u32 {
    nearby_core::config::DEFAULT_FEED_LIMIT
}
fn default_preview_len() -> usize {
    nearby_core::store::DEFAULT_PREVIEW_LEN
}

impl Default for Config {
    fn default() -> Self {
        Self {
            peer_name: None,
            discovery_port: default_discovery_port(),
            transport_port: default_transport_port(),
            request_timeout_secs: default_request_timeout_secs(),
            feed_pull_secs: default_feed_pull_secs(),
            feed_limit: default_feed_limit(),
            preview_len: default_preview_len(),
        }
    }
}

impl Config {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            request_timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
            feed_pull_interval: Duration::from_secs(self.feed_pull_secs.max(1)),
            default_feed_limit: self.feed_limit,
            preview_len: self.preview_len,
            ..SyncConfig::default()
        }
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(s) = var("NEARBY_PEER_NAME") {
            if !s.trim().is_empty() {
                self.peer_name = Some(s.trim().to_string());
            }
        }
        if let Some(p) = var("NEARBY_DISCOVERY_PORT").and_then(|s| s.parse().ok()) {
            self.discovery_port = p;
        }
        if let Some(p) = var("NEARBY_TRANSPORT_PORT").and_then(|s| s.parse().ok()) {
            self.transport_port = p;
        }
        if let Some(n) = var("NEARBY_REQUEST_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.request_timeout_secs = n;
        }
        if let Some(n) = var("NEARBY_FEED_PULL_SECS").and_then(|s| s.parse().ok()) {
            self.feed_pull_secs = n;
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let mut c = load_file().unwrap_or_default();
    c.apply_env(|k| std::env::var(k).ok());
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/nearby/config.toml"));
    }
    out.push(PathBuf::from("/etc/nearby/config.toml"));
    out
}

fn load_file() -> Option<Config> {
    for p in config_paths() {
        if p.exists() {
            match std::fs::read_to_string(&p).map(|s| toml::from_str::<Config>(&s)) {
                Ok(Ok(c)) => {
                    tracing::info!(path = %p.display(), "loaded config");
                    return Some(c);
                }
                Ok(Err(e)) => tracing::warn!(path = %p.display(), error = %e, "invalid config, using defaults"),
                Err(e) => tracing::warn!(path = %p.display(), error = %e, "unreadable config, using defaults"),
            }
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let c: Config = toml::from_str("transport_port = 5000\nfeed_pull_secs = 30\n").unwrap();
        assert_eq!(c.transport_port, 5000);
        assert_eq!(c.discovery_port, 45678);
        assert_eq!(c.sync_config().feed_pull_interval, Duration::from_secs(30));
        assert_eq!(c.sync_config().request_timeout, Duration::from_secs(10));
    }

    #[test]
    fn preview_len_flows_into_sync_config() {
        let c: Config = toml::from_str("preview_len = 12\n").unwrap();
        assert_eq!(c.sync_config().preview_len, 12);
        assert_eq!(Config::default().sync_config().preview_len, 140);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("proxy_port = 3128\n").is_err());
    }

    #[test]
    fn env_overrides_file() {
        let env: HashMap<&str, &str> = [
            ("NEARBY_PEER_NAME", " kitchen "),
            ("NEARBY_TRANSPORT_PORT", "6000"),
            ("NEARBY_DISCOVERY_PORT", "not-a-port"),
            ("NEARBY_REQUEST_TIMEOUT_SECS", "3"),
        ]
        .into_iter()
        .collect();
        let mut c = Config::default();
        c.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.peer_name.as_deref(), Some("kitchen"));
        assert_eq!(c.transport_port, 6000);
        assert_eq!(c.discovery_port, 45678);
        assert_eq!(c.sync_config().request_timeout, Duration::from_secs(3));
    }
}
