//! Process-local TTL cache
//!
//! The [`Cache`] trait only exposes get / set / delete. [`TtlCache`] stores
//! type-erased values in a `DashMap` so callers can hold whatever shape they
//! need and detect a foreign shape by downcasting.
//!
//! Expiry is enforced lazily on read; [`TtlCache::spawn_janitor`] sweeps the
//! remaining expired entries periodically. Time comes from `tokio::time`, so
//! a paused runtime clock drives expiry in tests.

use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A cached value of any shape
pub type CacheValue = Arc<dyn Any + Send + Sync>;

/// Lifetime of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Use the cache's configured default
    Default,
    /// Keep until deleted or overwritten
    Never,
    /// Expire after the given duration
    For(Duration),
}

/// Key/value cache capabilities
pub trait Cache: Send + Sync {
    /// Value stored under `key`, or `None` when absent or expired
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Store `value` under `key`, replacing any previous entry
    fn set(&self, key: &str, value: CacheValue, ttl: Ttl);

    /// Remove `key`; absent keys are ignored
    fn delete(&self, key: &str);
}

#[derive(Clone)]
struct Entry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// DashMap-backed cache with per-entry TTL
#[derive(Clone)]
pub struct TtlCache {
    entries: Arc<DashMap<String, Entry>>,
    default_ttl: Duration,
}

impl TtlCache {
    /// Create a cache whose `Ttl::Default` entries live for `default_ttl`
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Sweep expired entries every `interval` until `shutdown` is cancelled
    pub fn spawn_janitor(&self, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.purge_expired();
                        if removed > 0 {
                            tracing::debug!(removed, remaining = cache.len(), "Purged expired cache entries");
                        }
                    }
                    _ = shutdown.cancelled() => {
                        tracing::debug!("Cache janitor stopped");
                        return;
                    }
                }
            }
        })
    }

    /// Deadline for an entry; a TTL too large to represent never expires
    fn expiry(&self, ttl: Ttl) -> Option<Instant> {
        let duration = match ttl {
            Ttl::Default => self.default_ttl,
            Ttl::Never => return None,
            Ttl::For(duration) => duration,
        };
        Instant::now().checked_add(duration)
    }
}

impl Cache for TtlCache {
    fn get(&self, key: &str) -> Option<CacheValue> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if !entry.is_expired(now) {
                return Some(entry.value.clone());
            }
        }
        // The read guard is released before removing
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    fn set(&self, key: &str, value: CacheValue, ttl: Ttl) {
        let expires_at = self.expiry(ttl);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
    }

    fn delete(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn value(s: &str) -> CacheValue {
        Arc::new(s.to_string())
    }

    fn as_string(v: CacheValue) -> String {
        v.downcast::<String>().map(|s| (*s).clone()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_until_ttl_elapses() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.set("k", value("v"), Ttl::For(Duration::from_secs(10)));

        assert_eq!(as_string(cache.get("k").unwrap()), "v");

        tokio::time::advance(Duration::from_secs(9)).await;
        assert_eq!(as_string(cache.get("k").unwrap()), "v");

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").is_none());
        // Lazy expiry removes the entry
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_ttl() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", value("v"), Ttl::Default);

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(cache.get("k").is_some());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.get("k").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_expires() {
        let cache = TtlCache::new(Duration::from_secs(1));
        cache.set("k", value("v"), Ttl::Never);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(cache.get("k").is_some());
    }

    #[tokio::test]
    async fn test_overwrite_and_delete() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", value("one"), Ttl::Default);
        cache.set("k", value("two"), Ttl::Default);
        assert_eq!(as_string(cache.get("k").unwrap()), "two");

        cache.delete("k");
        assert!(cache.get("k").is_none());

        // Deleting a missing key is fine
        cache.delete("missing");
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("short", value("a"), Ttl::For(Duration::from_secs(1)));
        cache.set("long", value("b"), Ttl::Never);

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("long").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_sweeps_and_stops() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("k", value("v"), Ttl::For(Duration::from_secs(5)));

        let shutdown = CancellationToken::new();
        let handle = cache.spawn_janitor(Duration::from_secs(10), shutdown.clone());

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert!(cache.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_values_keep_their_shape() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("n", Arc::new(42u32), Ttl::Default);

        let v = cache.get("n").unwrap();
        assert!(v.clone().downcast::<String>().is_err());
        assert_eq!(*v.downcast::<u32>().unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_ttl_never_expires() {
        let cache = TtlCache::new(Duration::MAX);
        cache.set("k", value("v"), Ttl::Default);
        cache.set("j", value("w"), Ttl::For(Duration::from_secs(u64::MAX)));

        tokio::time::advance(Duration::from_secs(365 * 24 * 3600)).await;
        assert_eq!(as_string(cache.get("k").unwrap()), "v");
        assert_eq!(as_string(cache.get("j").unwrap()), "w");
        assert_eq!(cache.purge_expired(), 0);
    }
}
