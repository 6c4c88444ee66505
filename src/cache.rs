//! Per-endpoint time-bounded keyed cache (spec §2.3, §4.1).

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::clock::{Clock, SystemClock};

/// A value that knows how to derive its own cache key, mirroring
/// `Sample.cacheKey()` / `Extract.cacheKey()` in spec §3/§4.4.
pub trait CacheKeyed {
    fn cache_key(&self) -> String;
}

#[derive(Clone)]
struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// A concurrent, TTL-bounded cache keyed by `T::cache_key()`. No size cap
/// (spec §4.1 assumes a bounded key space per endpoint); eviction is lazy
/// on access, plus an optional periodic sweep.
///
/// Safe for many concurrent readers and writers; last write to a given
/// key wins.
pub struct Cache<T> {
    entries: Arc<DashMap<String, Entry<T>>>,
    clock: Arc<dyn Clock>,
    _marker: PhantomData<T>,
}

impl<T> Clone for Cache<T> {
    fn clone(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            clock: self.clock.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: CacheKeyed + Clone + Send + Sync + 'static> Cache<T> {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Same as [`Cache::new`], but drives TTL expiry off `clock` instead of
    /// the system clock. Lets tests control expiry deterministically.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
            _marker: PhantomData,
        }
    }

    /// Stores `value` under `value.cache_key()` with expiry
    /// `now + ttl_millis`. A `ttl_millis <= 0` is a no-op (spec §4.1).
    pub fn put(&self, value: T, ttl_millis: i64) {
        if ttl_millis <= 0 {
            return;
        }
        let key = value.cache_key();
        let expires_at = self.clock.now() + Duration::from_millis(ttl_millis as u64);
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Returns the cached value for `key`, or `None` on a miss (absent, or
    /// present but expired). A read past `expires_at` behaves as a miss
    /// and lazily evicts the stale entry (spec §4.1).
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now();
        let hit = self.entries.get(key);
        match hit {
            Some(entry) if entry.expires_at > now => Some(entry.value.clone()),
            Some(entry) => {
                drop(entry);
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Removes every entry whose TTL has elapsed. Intended to be driven by
    /// a periodic background task (spec §4.1, §5).
    pub fn sweep(&self) {
        let now = self.clock.now();
        self.entries.retain(|_, entry| entry.expires_at > now);
    }

    /// Spawns a background task that calls [`Cache::sweep`] every
    /// `interval`. The task runs until the returned handle is dropped or
    /// aborted.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let cache = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                cache.sweep();
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: CacheKeyed + Clone + Send + Sync + 'static> Default for Cache<T> {
    fn default() -> Self {
        Self::new()
    }
}
