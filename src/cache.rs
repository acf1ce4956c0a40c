//! In-memory TTL cache for upstream payloads
//!
//! Both cache tiers live in the same [`TtlCache`]; the gateway keeps them
//! apart with a key prefix. Entries are only removed by [`TtlCache::clear`],
//! by being overwritten, or by expiring. There is no size bound, which is
//! acceptable for the handful of resources a dashboard requests.

use crate::clock::Clock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

/// A single cached payload
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub value: Value,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    /// An entry is expired strictly after `stored_at + ttl`
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) > self.ttl
    }
}

/// Snapshot of cache contents and lifetime counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Keys currently held (expired but not yet purged entries included)
    pub keys: Vec<String>,
    pub hit_count: u64,
    pub miss_count: u64,
}

/// Key/value store with per-entry expiration
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TtlCache {
    /// Creates an empty cache reading time from `clock`
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Returns the value for `key` unless it is absent or expired
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let entries = self.entries.read().await;

        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key, "Cache hit");
                Some(entry.value.clone())
            }
            _ => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(key, "Cache miss");
                None
            }
        }
    }

    /// Stores `value` under `key`, replacing any previous entry
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            stored_at: self.clock.now(),
            ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        tracing::debug!(key, ttl_secs = ttl.as_secs(), "Cached payload");
    }

    /// Drops every entry. Hit and miss counters are kept.
    pub async fn clear(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        tracing::info!(dropped, "Cache cleared");
    }

    /// Lists held keys and the lifetime hit/miss counters
    pub async fn stats(&self) -> CacheStats {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();

        CacheStats {
            keys,
            hit_count: self.hits.load(Ordering::Relaxed),
            miss_count: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Removes expired entries, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Starts a background task purging expired entries every `interval`
    ///
    /// The task only holds a weak reference and exits once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    tracing::debug!("Cache dropped, stopping sweeper");
                    break;
                };
                let purged = cache.purge_expired().await;
                if purged > 0 {
                    tracing::debug!(purged, "Purged expired cache entries");
                }
            }
        })
    }
}
