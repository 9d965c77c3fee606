use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub message: String,
    pub phrase_count: usize,
}

impl CacheKey {
    pub fn new(message: &str, phrase_count: usize) -> Self {
        Self {
            message: message.to_lowercase(),
            phrase_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedMatch {
    pub matched: bool,
    pub similarity: f64,
    pub pattern: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub usage_percent: usize,
}

/// Bounded map of fuzzy-match results. When full, the whole map is cleared
/// before the next insert; there is no per-entry eviction.
#[derive(Debug)]
pub struct SimilarityCache {
    capacity: usize,
    entries: Mutex<HashMap<CacheKey, CachedMatch>>,
}

impl SimilarityCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(HashMap::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedMatch> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put(&self, key: CacheKey, value: CachedMatch) {
        let mut entries = self.entries.lock();
        Self::insert_bounded(&mut entries, self.capacity, key, value);
    }

    /// Returns the cached value, or computes and stores it. The lock is held
    /// across `compute`, so the lookup and the store are one atomic step.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> (CachedMatch, bool)
    where
        F: FnOnce() -> CachedMatch,
    {
        let mut entries = self.entries.lock();
        if let Some(hit) = entries.get(&key) {
            return (hit.clone(), true);
        }
        let value = compute();
        Self::insert_bounded(&mut entries, self.capacity, key, value.clone());
        (value, false)
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
        tracing::debug!("similarity cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.len();
        CacheStats {
            size,
            capacity: self.capacity,
            usage_percent: size * 100 / self.capacity,
        }
    }

    fn insert_bounded(
        entries: &mut HashMap<CacheKey, CachedMatch>,
        capacity: usize,
        key: CacheKey,
        value: CachedMatch,
    ) {
        if !entries.contains_key(&key) && entries.len() >= capacity {
            tracing::debug!(capacity, "similarity cache full, clearing");
            entries.clear();
        }
        entries.insert(key, value);
    }
}
