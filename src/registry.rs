//! Sharded, memory-bounded per-source registry with LRU eviction.
//!
//! Labels hash (xxh3) onto a fixed set of `RwLock<HashMap>` shards so that
//! unrelated sources never contend on one lock. Entries are handed out as
//! `Arc`s; callers keep using an entry even if it is evicted meanwhile.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Maximum number of sources to keep
    pub max_sources: usize,
    pub shards: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sources: 100_000,
            shards: 16,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub total_sources: usize,
    pub total_creations: u64,
    pub total_evictions: u64,
    pub capacity: usize,
}

#[derive(Debug)]
struct Entry<S> {
    state: Arc<S>,
    /// Logical clock value of the last access
    last_access: AtomicU64,
}

type Shard<S> = RwLock<HashMap<String, Entry<S>>>;

pub struct SourceRegistry<S> {
    shards: Vec<Shard<S>>,
    config: RegistryConfig,
    clock: AtomicU64,
    len: AtomicUsize,
    creations: AtomicU64,
    evictions: AtomicU64,
}

impl<S> SourceRegistry<S> {
    pub fn new(config: RegistryConfig) -> Self {
        let shards = (0..config.shards.max(1)).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            shards,
            config,
            clock: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            creations: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn shard_index(&self, label: &str) -> usize {
        (xxh3_64(label.as_bytes()) % self.shards.len() as u64) as usize
    }

    fn read(&self, idx: usize) -> RwLockReadGuard<'_, HashMap<String, Entry<S>>> {
        self.shards[idx].read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, idx: usize) -> RwLockWriteGuard<'_, HashMap<String, Entry<S>>> {
        self.shards[idx].write().unwrap_or_else(PoisonError::into_inner)
    }

    fn tick_clock(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, label: &str) -> bool {
        self.read(self.shard_index(label)).contains_key(label)
    }

    /// Look up a source, refreshing its LRU position.
    pub fn get(&self, label: &str) -> Option<Arc<S>> {
        let shard = self.read(self.shard_index(label));
        shard.get(label).map(|entry| {
            entry.last_access.store(self.tick_clock(), Ordering::Relaxed);
            Arc::clone(&entry.state)
        })
    }

    /// Look up or create a source. Creating into a full registry evicts the
    /// least recently used source first; the evicted label is returned.
    pub fn get_or_create<F>(&self, label: &str, create: F) -> (Arc<S>, Option<String>)
    where
        F: FnOnce() -> S,
    {
        if let Some(state) = self.get(label) {
            return (state, None);
        }

        let mut evicted = None;
        if self.len() >= self.config.max_sources.max(1) {
            evicted = self.evict_one();
        }

        let idx = self.shard_index(label);
        let mut shard = self.write(idx);
        // another writer may have created it while no lock was held
        if let Some(entry) = shard.get(label) {
            entry.last_access.store(self.tick_clock(), Ordering::Relaxed);
            return (Arc::clone(&entry.state), evicted);
        }
        let state = Arc::new(create());
        shard.insert(
            label.to_string(),
            Entry {
                state: Arc::clone(&state),
                last_access: AtomicU64::new(self.tick_clock()),
            },
        );
        self.len.fetch_add(1, Ordering::Relaxed);
        self.creations.fetch_add(1, Ordering::Relaxed);
        (state, evicted)
    }

    /// Evict the least recently accessed source.
    fn evict_one(&self) -> Option<String> {
        let mut oldest: Option<(usize, String, u64)> = None;
        for idx in 0..self.shards.len() {
            let shard = self.read(idx);
            for (label, entry) in shard.iter() {
                let stamp = entry.last_access.load(Ordering::Relaxed);
                if oldest.as_ref().is_none_or(|(_, _, best)| stamp < *best) {
                    oldest = Some((idx, label.clone(), stamp));
                }
            }
        }

        let (idx, label, stamp) = oldest?;
        let mut shard = self.write(idx);
        // skip if touched since the scan
        let still_oldest = shard
            .get(&label)
            .is_some_and(|e| e.last_access.load(Ordering::Relaxed) == stamp);
        if !still_oldest {
            return None;
        }
        shard.remove(&label);
        self.len.fetch_sub(1, Ordering::Relaxed);
        self.evictions.fetch_add(1, Ordering::Relaxed);
        Some(label)
    }

    pub fn remove(&self, label: &str) -> Option<Arc<S>> {
        let removed = self.write(self.shard_index(label)).remove(label);
        removed.map(|entry| {
            self.len.fetch_sub(1, Ordering::Relaxed);
            entry.state
        })
    }

    /// Every label, sorted.
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = (0..self.shards.len())
            .flat_map(|idx| self.read(idx).keys().cloned().collect::<Vec<_>>())
            .collect();
        labels.sort();
        labels
    }

    /// Snapshot of every entry without touching LRU order.
    pub fn entries(&self) -> Vec<(String, Arc<S>)> {
        (0..self.shards.len())
            .flat_map(|idx| {
                self.read(idx)
                    .iter()
                    .map(|(label, entry)| (label.clone(), Arc::clone(&entry.state)))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            total_sources: self.len(),
            total_creations: self.creations.load(Ordering::Relaxed),
            total_evictions: self.evictions.load(Ordering::Relaxed),
            capacity: self.config.max_sources,
        }
    }
}
