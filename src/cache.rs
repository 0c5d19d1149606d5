use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;
use crate::metrics::{CACHE_HITS, CACHE_MISSES, CACHE_SIZE};

pub const DEFAULT_TTL_MINUTES: f64 = 5.0;

// Upper bound on any single entry lifetime
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// Cache entry with timestamps
#[derive(Clone, Debug)]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: Instant,
    pub expires_at: Instant,
    seq: u64,
}

impl<T> CacheEntry<T> {
    pub fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct Store<T> {
    entries: HashMap<String, CacheEntry<T>>,
    // insertion sequence -> key, oldest first
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl<T> Store<T> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    fn evict_oldest(&mut self) -> Option<String> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key);
        Some(key)
    }
}

/// Bounded key/value store with per-entry expiry.
///
/// Eviction follows insertion order: when full, the oldest inserted entry is
/// dropped regardless of how much lifetime it has left. Reads do not refresh
/// an entry's position.
pub struct EphemeralCache<T> {
    max_size: usize,
    default_ttl_minutes: f64,
    store: Mutex<Store<T>>,
    in_flight: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl<T: Clone> EphemeralCache<T> {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size: max_size.max(1),
            default_ttl_minutes: DEFAULT_TTL_MINUTES,
            store: Mutex::new(Store {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_seq: 0,
            }),
            in_flight: DashMap::new(),
        }
    }

    pub fn with_default_ttl(mut self, minutes: f64) -> Self {
        self.default_ttl_minutes = minutes;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Store<T>> {
        // no critical section can panic halfway through an update
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ttl(&self, ttl_minutes: Option<f64>) -> Duration {
        let minutes = ttl_minutes.unwrap_or(self.default_ttl_minutes);
        if minutes.is_nan() || minutes <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(minutes * 60.0)
            .unwrap_or(MAX_TTL)
            .min(MAX_TTL)
    }

    pub fn set(&self, key: &str, data: T, ttl_minutes: Option<f64>) {
        self.set_at(key, data, ttl_minutes, Instant::now());
    }

    pub fn set_at(&self, key: &str, data: T, ttl_minutes: Option<f64>, now: Instant) {
        let ttl = self.ttl(ttl_minutes);
        let mut store = self.lock();

        // an entry that can never be served must not push out a live one
        if ttl.is_zero() {
            store.remove(key);
            CACHE_SIZE.set(store.entries.len() as f64);
            return;
        }

        // capacity is checked before the write, overwrites included
        if store.entries.len() >= self.max_size {
            if let Some(evicted) = store.evict_oldest() {
                debug!(key = %evicted, "cache full, evicted oldest entry");
            }
        }

        let expires_at = now + ttl;
        match store.entries.get_mut(key) {
            // overwriting keeps the key's place in the eviction order
            Some(entry) => {
                entry.data = data;
                entry.created_at = now;
                entry.expires_at = expires_at;
            }
            None => {
                let seq = store.next_seq;
                store.next_seq += 1;
                store.order.insert(seq, key.to_string());
                store.entries.insert(
                    key.to_string(),
                    CacheEntry {
                        data,
                        created_at: now,
                        expires_at,
                        seq,
                    },
                );
            }
        }
        CACHE_SIZE.set(store.entries.len() as f64);
    }

    pub fn get(&self, key: &str) -> Option<T> {
        self.get_at(key, Instant::now())
    }

    pub fn get_at(&self, key: &str, now: Instant) -> Option<T> {
        let mut store = self.lock();
        let fresh = store.entries.get(key).map(|entry| entry.is_fresh(now))?;
        if fresh {
            return store.entries.get(key).map(|entry| entry.data.clone());
        }
        store.remove(key);
        CACHE_SIZE.set(store.entries.len() as f64);
        None
    }

    pub fn delete(&self, key: &str) -> bool {
        let mut store = self.lock();
        let removed = store.remove(key).is_some();
        CACHE_SIZE.set(store.entries.len() as f64);
        removed
    }

    pub fn clear(&self) {
        let mut store = self.lock();
        store.entries.clear();
        store.order.clear();
        CACHE_SIZE.set(0.0);
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the cached value for `key`, or awaits `fetch` and caches its
    /// result. A failed fetch is returned as-is and leaves the cache alone.
    ///
    /// Concurrent misses on the same key each run their own fetch.
    pub async fn cached_fetch<F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
        ttl_minutes: Option<f64>,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key) {
            CACHE_HITS.inc();
            debug!(%key, "cache hit");
            return Ok(hit);
        }
        CACHE_MISSES.inc();
        debug!(%key, "cache miss");

        let fresh = fetch().await?;
        self.set(key, fresh.clone(), ttl_minutes);
        Ok(fresh)
    }

    /// Like [`cached_fetch`](Self::cached_fetch), but concurrent misses on the
    /// same key queue behind one in-flight fetch and then read its result
    /// from the cache. When that fetch fails, the next waiter fetches itself.
    pub async fn coalesced_fetch<F, Fut, E>(
        &self,
        key: &str,
        fetch: F,
        ttl_minutes: Option<f64>,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get(key) {
            CACHE_HITS.inc();
            debug!(%key, "cache hit");
            return Ok(hit);
        }

        let gate = Arc::clone(&*self.in_flight.entry(key.to_string()).or_default());
        let mut slot = InFlight {
            gates: &self.in_flight,
            key,
            guard: None,
        };
        slot.guard = Some(gate.lock_owned().await);

        match self.get(key) {
            Some(hit) => {
                CACHE_HITS.inc();
                debug!(%key, "cache hit after waiting on in-flight fetch");
                Ok(hit)
            }
            None => {
                CACHE_MISSES.inc();
                debug!(%key, "cache miss");
                fetch()
                    .await
                    .inspect(|fresh| self.set(key, fresh.clone(), ttl_minutes))
            }
        }
    }
}

// Holds a caller's place on a key's in-flight gate. Dropping it, on return or
// when the caller's future is cancelled, removes the gate once nobody else is
// queued on it.
struct InFlight<'a> {
    gates: &'a DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    key: &'a str,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.guard.take();
        // only the map still holds the gate once nobody is queued on it
        self.gates
            .remove_if(self.key, |_, gate| Arc::strong_count(gate) == 1);
    }
}

// Create a cache key for an upstream read (hash of method + resource)
pub fn make_cache_key(method: &str, resource: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(method);
    hasher.update(b" ");
    hasher.update(resource);
    format!("{:x}", hasher.finalize())
}
