//! Content-addressable extraction cache.
//!
//! Entries are keyed by `(source_id, content_hash)` where the hash covers the
//! exact prompt sent for extraction. A hit returns the stored
//! [`ExtractionResult`] without calling the extraction service; a miss
//! computes it, stores it, and removes every other entry of the same source,
//! so there is at most one entry per source identifier.
//!
//! The cache never fails because of its own storage: unreadable or corrupt
//! entries count as misses and write failures only cost the caching.
//!
//! Storage is abstracted behind [`BlobStore`]. The filesystem implementation
//! (`{source_id}.{hash}.json` files) lives in the app crate;
//! [`MemoryBlobStore`] is used in tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;

use crate::error::Result;
use crate::models::{content_hash, ExtractionResult};

/// File extension of serialized cache entries.
pub const CACHE_EXTENSION: &str = "json";

/// Key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source_id: String,
    pub hash: String,
}

impl CacheKey {
    pub fn new(source_id: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            hash: hash.into(),
        }
    }

    /// Entry name: `{source_id}.{hash}.json`.
    pub fn entry_name(&self) -> String {
        format!("{}.{}.{}", self.source_id, self.hash, CACHE_EXTENSION)
    }

    /// Prefix shared by every entry of this key's source.
    pub fn source_prefix(&self) -> String {
        format!("{}.", self.source_id)
    }
}

/// Key-value storage for serialized cache entries.
pub trait BlobStore: Send + Sync {
    /// Read an entry; `Ok(None)` when it does not exist.
    fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<()>;

    /// Remove every entry of `key.source_id` other than `key` itself.
    ///
    /// Returns the number of entries removed.
    fn remove_stale(&self, key: &CacheKey) -> Result<usize>;
}

/// Result of [`ContentCache::get_or_create`].
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub result: ExtractionResult,
    /// Hash of the request content, also used as the source version.
    pub content_hash: String,
    /// `true` when served from the cache without computing.
    pub cached: bool,
}

/// Content-addressable cache over a [`BlobStore`].
pub struct ContentCache<B> {
    blobs: B,
}

impl<B: BlobStore> ContentCache<B> {
    pub fn new(blobs: B) -> Self {
        Self { blobs }
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    /// Key for `request_content` under `source_id`.
    pub fn key_for(source_id: &str, request_content: &str) -> CacheKey {
        CacheKey::new(source_id, content_hash(request_content))
    }

    /// Return the cached result for `request_content`, computing and storing
    /// it on a miss.
    ///
    /// Errors from `compute` are returned unchanged; nothing is stored and no
    /// stale entry is removed in that case.
    pub async fn get_or_create<F, Fut>(
        &self,
        source_id: &str,
        request_content: &str,
        compute: F,
    ) -> Result<CacheLookup>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ExtractionResult>>,
    {
        let key = Self::key_for(source_id, request_content);

        if let Some(result) = self.lookup(&key) {
            tracing::debug!(entry = %key.entry_name(), "extraction cache hit");
            return Ok(CacheLookup {
                result,
                content_hash: key.hash,
                cached: true,
            });
        }

        let result = compute().await?;
        self.store(&key, &result);

        match self.blobs.remove_stale(&key) {
            Ok(0) => {}
            Ok(n) => {
                tracing::info!(source = %source_id, removed = n, "removed stale cache entries")
            }
            Err(e) => tracing::warn!(
                source = %source_id,
                error = %e,
                "failed to remove stale cache entries"
            ),
        }

        Ok(CacheLookup {
            result,
            content_hash: key.hash,
            cached: false,
        })
    }

    /// Read and decode an entry; any failure counts as a miss.
    pub fn lookup(&self, key: &CacheKey) -> Option<ExtractionResult> {
        let bytes = match self.blobs.read(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(
                    entry = %key.entry_name(),
                    error = %e,
                    "cache read failed, recomputing"
                );
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(
                    entry = %key.entry_name(),
                    error = %e,
                    "corrupt cache entry, recomputing"
                );
                None
            }
        }
    }

    /// Encode and write an entry. Returns whether the write succeeded.
    pub fn store(&self, key: &CacheKey, result: &ExtractionResult) -> bool {
        let bytes = match serde_json::to_vec_pretty(result) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(
                    entry = %key.entry_name(),
                    error = %e,
                    "failed to encode cache entry"
                );
                return false;
            }
        };

        match self.blobs.write(key, &bytes) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    entry = %key.entry_name(),
                    error = %e,
                    "cache write failed, result not cached"
                );
                false
            }
        }
    }
}

/// In-memory [`BlobStore`] for tests.
#[derive(Default)]
pub struct MemoryBlobStore {
    entries: RwLock<HashMap<CacheKey, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes currently stored for `source_id`.
    pub fn hashes_for(&self, source_id: &str) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut hashes: Vec<String> = entries
            .keys()
            .filter(|k| k.source_id == source_id)
            .map(|k| k.hash.clone())
            .collect();
        hashes.sort();
        hashes
    }

    /// Overwrite an entry with arbitrary bytes.
    pub fn put_raw(&self, key: CacheKey, bytes: Vec<u8>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, bytes);
    }
}

impl BlobStore for MemoryBlobStore {
    fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<()> {
        self.put_raw(key.clone(), bytes.to_vec());
        Ok(())
    }

    fn remove_stale(&self, key: &CacheKey) -> Result<usize> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|k, _| k.source_id != key.source_id || k == key);
        Ok(before - entries.len())
    }
}
