//! Verdict memoization.
//!
//! The orchestrator only talks to [`ResultCache`]; TTL and storage medium are the cache's
//! concern. [`MemoryVerdictCache`] is the bundled in-process implementation and
//! [`NoopCache`] disables caching altogether.
//!
//! # Example Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! ttl_seconds = 3600
//! max_entries = 10000
//! ```

use crate::{key::Key, verdict::Verdict};
use async_trait::async_trait;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::trace;

/// Storage for verdicts keyed by [`Key`].
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Returns the live entry for `key`, if any.
    async fn get(&self, key: &Key) -> Option<Verdict>;

    async fn put(&self, key: Key, verdict: Verdict, ttl: Duration);

    async fn invalidate(&self, key: &Key);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Lifetime of a cached verdict (default: 3600).
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum number of cached keys (default: 10000).
    #[serde(default = "default_max_entries")]
    pub max_entries: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_max_entries() -> u64 {
    10_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl_seconds: default_ttl_seconds(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Builds the cache this configuration describes.
    #[must_use]
    pub fn build(&self) -> Arc<dyn ResultCache> {
        if self.enabled {
            Arc::new(MemoryVerdictCache::new(self.max_entries))
        } else {
            Arc::new(NoopCache)
        }
    }
}

#[derive(Clone)]
struct CachedVerdict {
    verdict: Arc<Verdict>,
    expires_at: Instant,
}

/// Bounded in-memory cache with per-entry expiry.
///
/// Entries are stamped with their expiry at insert time and dropped on the first read after
/// it; capacity eviction is left to moka.
pub struct MemoryVerdictCache {
    entries: Cache<Key, CachedVerdict>,
}

impl MemoryVerdictCache {
    #[must_use]
    pub fn new(max_entries: u64) -> Self {
        Self { entries: Cache::builder().max_capacity(max_entries).build() }
    }

    /// Approximate number of entries, including expired ones not read since expiry.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entries.entry_count()
    }

    /// Applies pending moka maintenance (evictions, counts).
    pub async fn run_pending_tasks(&self) {
        self.entries.run_pending_tasks().await;
    }
}

#[async_trait]
impl ResultCache for MemoryVerdictCache {
    async fn get(&self, key: &Key) -> Option<Verdict> {
        let cached = self.entries.get(key).await?;
        if Instant::now() >= cached.expires_at {
            trace!(key = %key, "cached verdict expired");
            self.entries.invalidate(key).await;
            return None;
        }
        Some((*cached.verdict).clone())
    }

    async fn put(&self, key: Key, verdict: Verdict, ttl: Duration) {
        let cached = CachedVerdict { verdict: Arc::new(verdict), expires_at: Instant::now() + ttl };
        self.entries.insert(key, cached).await;
    }

    async fn invalidate(&self, key: &Key) {
        self.entries.invalidate(key).await;
    }
}

/// Cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCache;

#[async_trait]
impl ResultCache for NoopCache {
    async fn get(&self, _key: &Key) -> Option<Verdict> {
        None
    }

    async fn put(&self, _key: Key, _verdict: Verdict, _ttl: Duration) {}

    async fn invalidate(&self, _key: &Key) {}
}
