// Response cache used by the request engine
// Keys are request URLs (or URL + encoded form for submitted searches), values are raw payloads

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache capacity exceeded storing {key} ({size_bytes} bytes)")]
    CapacityExceeded { key: String, size_bytes: usize },
}

// Key/value store the engine reads through and writes back to.
// Only single-key atomicity is expected; concurrent writers to one key may race (last write wins).
pub trait CacheStore: Send + Sync + 'static {
    // Returns None when the key is absent
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    // A failed write is reported, never swallowed
    fn set(&self, key: &str, data: &[u8]) -> Result<(), CacheError>;
}

impl<S: CacheStore + ?Sized> CacheStore for Box<S> {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        (**self).set(key, data)
    }
}

impl<S: CacheStore + ?Sized> CacheStore for std::sync::Arc<S> {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        (**self).set(key, data)
    }
}

// Cache configuration options
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_size_mb: 256 }
    }
}

#[derive(Debug, Default)]
pub struct CacheStats {
    pub size_bytes: AtomicUsize,
    pub items_count: AtomicUsize,
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub write_count: AtomicUsize,
    pub rejected_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheStatsReport {
    pub size_bytes: usize,
    pub items_count: usize,
    pub hit_count: usize,
    pub miss_count: usize,
    pub write_count: usize,
    pub rejected_count: usize,
}

pub fn calculate_item_size(key: &str, data: &[u8]) -> usize {
    key.len() + data.len()
}

// In-memory store, safe for concurrent readers and writers
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
    max_size_bytes: usize,
    stats: CacheStats,
}

impl MemoryStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            max_size_bytes: config.max_size_mb * 1024 * 1024,
            stats: CacheStats::default(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            size_bytes: self.stats.size_bytes.load(Ordering::SeqCst),
            items_count: self.stats.items_count.load(Ordering::SeqCst),
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            write_count: self.stats.write_count.load(Ordering::SeqCst),
            rejected_count: self.stats.rejected_count.load(Ordering::SeqCst),
        }
    }

    fn check_capacity(
        &self,
        key: &str,
        item_size: usize,
        replaced_size: usize,
    ) -> Result<(), CacheError> {
        let current_size = self.stats.size_bytes.load(Ordering::SeqCst);
        if current_size.saturating_sub(replaced_size) + item_size > self.max_size_bytes {
            self.stats.rejected_count.fetch_add(1, Ordering::SeqCst);
            warn!(
                key,
                item_size,
                current_size,
                max_size = self.max_size_bytes,
                "cache write rejected"
            );
            return Err(CacheError::CapacityExceeded {
                key: key.to_string(),
                size_bytes: item_size,
            });
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
                debug!(key, "cache hit");
                Some(entry.value().clone())
            }
            None => {
                self.stats.miss_count.fetch_add(1, Ordering::SeqCst);
                debug!(key, "cache miss");
                None
            }
        }
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        let item_size = calculate_item_size(key, data);

        // The entry guard serialises size accounting per key
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                let previous_size = calculate_item_size(key, entry.get());
                self.check_capacity(key, item_size, previous_size)?;
                entry.insert(data.to_vec());
                self.stats.size_bytes.fetch_add(item_size, Ordering::SeqCst);
                self.stats
                    .size_bytes
                    .fetch_sub(previous_size, Ordering::SeqCst);
            }
            Entry::Vacant(entry) => {
                self.check_capacity(key, item_size, 0)?;
                entry.insert(data.to_vec());
                self.stats.size_bytes.fetch_add(item_size, Ordering::SeqCst);
                self.stats.items_count.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.stats.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// Never serves reads, still records writes.
// Forces live fetches while keeping the cache populated for a later replay.
pub struct WriteOnlyStore<S> {
    inner: S,
}

impl<S: CacheStore> WriteOnlyStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: CacheStore> CacheStore for WriteOnlyStore<S> {
    fn get(&self, _key: &str) -> Option<Vec<u8>> {
        None
    }

    fn set(&self, key: &str, data: &[u8]) -> Result<(), CacheError> {
        self.inner.set(key, data)
    }
}
