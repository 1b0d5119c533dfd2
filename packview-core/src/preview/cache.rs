//! Memo of decoded images keyed by entry path and every parameter that affects pixels.

use std::sync::Arc;

use lru::LruCache;
use tracing::debug;

use crate::config::PreviewConfig;
use crate::error::Result;
use crate::path::EntryPath;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecodeCacheKey {
    /// Canonical path key of the entry.
    pub path: String,
    /// Fingerprint of the decode parameters (palette identity and the like).
    pub params: String,
}

impl DecodeCacheKey {
    pub fn new(path: &EntryPath, params: impl Into<String>) -> Self {
        Self {
            path: path.key().to_string(),
            params: params.into(),
        }
    }
}

pub struct DecodeCache<V> {
    enabled: bool,
    entries: LruCache<DecodeCacheKey, Arc<V>>,
    hits: u64,
    misses: u64,
}

impl<V> DecodeCache<V> {
    pub fn new(config: &PreviewConfig) -> Self {
        let entries = match config.cache_capacity {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            enabled: config.cache_enabled,
            entries,
            hits: 0,
            misses: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turning the cache off also drops what it holds.
    pub fn set_enabled(&mut self, enabled: bool) {
        if !enabled {
            self.clear();
        }
        self.enabled = enabled;
    }

    /// Cached value for `key`. Counts a hit or a miss while enabled.
    pub fn lookup(&mut self, key: &DecodeCacheKey) -> Option<Arc<V>> {
        if !self.enabled {
            return None;
        }
        match self.entries.get(key) {
            Some(v) => {
                self.hits += 1;
                debug!(path = %key.path, params = %key.params, "decode cache hit");
                Some(v.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Store a freshly decoded value. If another decode of `key` landed first, that instance
    /// is kept and returned so every caller shares one value.
    pub fn insert(&mut self, key: DecodeCacheKey, value: V) -> Arc<V> {
        if !self.enabled {
            return Arc::new(value);
        }
        if let Some(v) = self.entries.get(&key) {
            return v.clone();
        }
        let v = Arc::new(value);
        self.entries.put(key, v.clone());
        v
    }

    /// Drop every record for `path_key`, whatever its parameters. Returns how many went.
    pub fn invalidate_path(&mut self, path_key: &str) -> usize {
        let doomed: Vec<DecodeCacheKey> = self
            .entries
            .iter()
            .filter(|(k, _)| k.path == path_key)
            .map(|(k, _)| k.clone())
            .collect();
        for k in &doomed {
            self.entries.pop(k);
        }
        if !doomed.is_empty() {
            debug!(path = path_key, count = doomed.len(), "decode cache invalidated");
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(hits, misses)` since construction.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
