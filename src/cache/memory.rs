use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::store::{CacheError, CacheStore};

/// In-process cache with per-key expiry.
///
/// Every `set` sweeps the entries whose expiry has passed, so keys that are
/// written once and never read again do not accumulate. A read of an expired
/// key also drops it.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<Entries>,
    gets: AtomicU64,
    sets: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryCacheStats {
    pub gets: u64,
    pub sets: u64,
}

/// Values plus an expiry-ordered index over the same keys.
#[derive(Default)]
struct Entries {
    values: HashMap<String, (String, Instant)>,
    expiries: BTreeSet<(Instant, String)>,
}

impl Entries {
    fn insert(&mut self, key: &str, value: String, expires_at: Instant) {
        if let Some((_, previous)) = self.values.insert(key.to_string(), (value, expires_at)) {
            self.expiries.remove(&(previous, key.to_string()));
        }
        self.expiries.insert((expires_at, key.to_string()));
    }

    fn remove(&mut self, key: &str) {
        if let Some((_, expires_at)) = self.values.remove(key) {
            self.expiries.remove(&(expires_at, key.to_string()));
        }
    }

    fn sweep(&mut self, now: Instant) -> usize {
        let mut swept = 0;
        while let Some((expires_at, _)) = self.expiries.first() {
            if *expires_at > now {
                break;
            }
            if let Some((_, key)) = self.expiries.pop_first() {
                self.values.remove(&key);
                swept += 1;
            }
        }
        swept
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MemoryCacheStats {
        MemoryCacheStats {
            gets: self.gets.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
        }
    }

    pub async fn contains_key(&self, key: &str) -> bool {
        let entries = self.entries.lock().await;
        matches!(entries.values.get(key), Some((_, expires_at)) if *expires_at > Instant::now())
    }

    /// Stored entries, including expired ones not yet swept.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.values.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.values.is_empty()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.gets.fetch_add(1, Ordering::Relaxed);
        let mut entries = self.entries.lock().await;

        match entries.values.get(key) {
            Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        self.sets.fetch_add(1, Ordering::Relaxed);
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        let swept = entries.sweep(now);
        if swept > 0 {
            tracing::debug!(swept = swept, "Swept expired cache entries");
        }
        entries.insert(key, value, now + ttl);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
