use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

struct Entry<K, V> {
    key: K,
    value: V,
    written_at: Instant,
    /// Position in the recency index.
    tick: u64,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<K, V>>,
    /// Recency index: lowest tick is the least recently used entry.
    order: BTreeMap<u64, K>,
    next_tick: u64,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone,
{
    fn touch(&mut self, key: &K) {
        let tick = self.next_tick;
        if let Some(entry) = self.entries.get_mut(key) {
            self.order.remove(&entry.tick);
            entry.tick = tick;
            self.order.insert(tick, entry.key.clone());
            self.next_tick += 1;
        }
    }

    fn remove(&mut self, key: &K) -> Option<Entry<K, V>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        Some(entry)
    }

    fn pop_lru(&mut self) -> Option<Entry<K, V>> {
        let (_, key) = self.order.pop_first()?;
        self.entries.remove(&key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub current_size: usize,
}

#[derive(Default)]
struct Stats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Stats {
    fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn evicted(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }
}

/// Size- and time-bounded read accelerator.
///
/// Holds at most `capacity` entries; inserting past that drops the least
/// recently used one. Entries older than `ttl` (measured from their last
/// write) are dropped on access or by [`BoundedCache::purge_expired`]. Both
/// kinds of removal count as evictions; [`BoundedCache::invalidate`] does not.
pub struct BoundedCache<K, V> {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner<K, V>>,
    stats: Stats,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
            }),
            stats: Stats::default(),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &K, now: Instant) -> Option<V> {
        let mut inner = self.inner.lock();

        let expired = match inner.entries.get(key) {
            None => {
                self.stats.miss();
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };

        if expired {
            inner.remove(key);
            self.stats.evicted(1);
            self.stats.miss();
            return None;
        }

        inner.touch(key);
        self.stats.hit();
        inner.entries.get(key).map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    pub(crate) fn insert_at(&self, key: K, value: V, now: Instant) {
        let mut inner = self.inner.lock();

        if let Some(entry) = inner.entries.get_mut(&key) {
            entry.value = value;
            entry.written_at = now;
            inner.touch(&key);
            return;
        }

        let tick = inner.next_tick;
        inner.next_tick += 1;
        inner.order.insert(tick, key.clone());
        inner.entries.insert(
            key.clone(),
            Entry {
                key,
                value,
                written_at: now,
                tick,
            },
        );

        let mut evicted = 0;
        while inner.entries.len() > self.capacity {
            if inner.pop_lru().is_none() {
                break;
            }
            evicted += 1;
        }
        if evicted > 0 {
            self.stats.evicted(evicted);
            tracing::debug!("Cache evicted {} entries over capacity {}", evicted, self.capacity);
        }
    }

    /// Removes a single key. Returns whether it was cached.
    pub fn invalidate(&self, key: &K) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.inner.lock();

        let expired: Vec<K> = inner
            .entries
            .values()
            .filter(|entry| self.is_expired(entry, now))
            .map(|entry| entry.key.clone())
            .collect();

        for key in &expired {
            inner.remove(key);
        }

        if !expired.is_empty() {
            self.stats.evicted(expired.len() as u64);
        }
        expired.len()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.stats.hits.load(Ordering::Relaxed);
        let misses = self.stats.misses.load(Ordering::Relaxed);
        let requests = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if requests == 0 {
                1.0
            } else {
                hits as f64 / requests as f64
            },
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            current_size: self.len(),
        }
    }

    fn is_expired(&self, entry: &Entry<K, V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.written_at) >= self.ttl
    }
}
