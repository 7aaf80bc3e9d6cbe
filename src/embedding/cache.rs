//! Embedding cache keyed by content hash
//!
//! Bounded by bytes with LRU eviction and a per-entry time-to-live. Keys
//! are sha256 digests of the input text, so a hit is indistinguishable
//! from a fresh computation for any caller.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::error::Result;

use super::Embedder;

/// Statistics for the embedding cache
#[derive(Debug, Clone)]
pub struct EmbeddingCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub bytes_used: usize,
    pub max_bytes: usize,
    /// Hit rate as percentage (0.0 - 100.0)
    pub hit_rate: f64,
}

struct CacheEntry {
    embedding: Arc<[f32]>,
    size_bytes: usize,
    inserted_at: Instant,
    last_used: u64,
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    bytes_used: usize,
    /// Monotonic access counter; the entry with the smallest value is LRU
    clock: u64,
}

/// Thread-safe LRU embedding cache with byte capacity and TTL
pub struct EmbeddingCache {
    state: Mutex<CacheState>,
    max_bytes: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    pub fn new(max_bytes: usize, ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                bytes_used: 0,
                clock: 0,
            }),
            max_bytes,
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Content-hash key for a text input
    pub fn key_for(text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up an embedding. Expired entries count as misses and are evicted.
    pub fn get(&self, key: &str) -> Option<Arc<[f32]>> {
        let mut state = self.state.lock();

        let expired = match state.entries.get(key) {
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
        };

        if expired {
            if let Some(entry) = state.entries.remove(key) {
                state.bytes_used -= entry.size_bytes;
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        state.clock += 1;
        let clock = state.clock;
        let entry = state.entries.get_mut(key)?;
        entry.last_used = clock;
        self.hits.fetch_add(1, Ordering::Relaxed);
        Some(entry.embedding.clone())
    }

    /// Insert an embedding, evicting least-recently-used entries to fit
    pub fn put(&self, key: String, embedding: Vec<f32>) {
        let size_bytes = embedding.len() * std::mem::size_of::<f32>();
        if size_bytes > self.max_bytes {
            return;
        }

        let arc: Arc<[f32]> = embedding.into();
        let mut state = self.state.lock();

        if let Some(old) = state.entries.remove(&key) {
            state.bytes_used -= old.size_bytes;
        }

        while state.bytes_used + size_bytes > self.max_bytes {
            let lru_key = state
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone());
            match lru_key {
                Some(k) => {
                    if let Some(evicted) = state.entries.remove(&k) {
                        state.bytes_used -= evicted.size_bytes;
                    }
                }
                None => break,
            }
        }

        state.clock += 1;
        let clock = state.clock;
        state.entries.insert(
            key,
            CacheEntry {
                embedding: arc,
                size_bytes,
                inserted_at: Instant::now(),
                last_used: clock,
            },
        );
        state.bytes_used += size_bytes;
    }

    pub fn stats(&self) -> EmbeddingCacheStats {
        let state = self.state.lock();
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        EmbeddingCacheStats {
            hits,
            misses,
            entries: state.entries.len(),
            bytes_used: state.bytes_used,
            max_bytes: self.max_bytes,
            hit_rate: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.bytes_used = 0;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Embedder wrapper that consults the cache before computing
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    cache: EmbeddingCache,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, max_bytes: usize, ttl: Duration) -> Self {
        Self {
            inner,
            cache: EmbeddingCache::new(max_bytes, ttl),
        }
    }

    pub fn cache_stats(&self) -> EmbeddingCacheStats {
        self.cache.stats()
    }
}

impl Embedder for CachedEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = EmbeddingCache::key_for(text);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.to_vec());
        }

        let embedding = self.inner.embed(text)?;
        self.cache.put(key, embedding.clone());
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;

    fn cache(max_bytes: usize) -> EmbeddingCache {
        EmbeddingCache::new(max_bytes, Duration::from_secs(3600))
    }

    #[test]
    fn test_basic_operations() {
        let cache = cache(1024 * 1024);

        cache.put("k".to_string(), vec![1.0, 2.0, 3.0]);
        let retrieved = cache.get("k").unwrap();
        assert_eq!(&*retrieved, &[1.0, 2.0, 3.0]);

        assert!(cache.get("nonexistent").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[test]
    fn test_lru_eviction() {
        // Room for three 16-byte entries
        let cache = cache(48);

        cache.put("a".to_string(), vec![1.0, 2.0, 3.0, 4.0]);
        cache.put("b".to_string(), vec![5.0, 6.0, 7.0, 8.0]);
        cache.put("c".to_string(), vec![9.0, 10.0, 11.0, 12.0]);
        assert_eq!(cache.len(), 3);

        // Touch "a" so "b" becomes the LRU entry
        let _ = cache.get("a");

        cache.put("d".to_string(), vec![13.0, 14.0, 15.0, 16.0]);
        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("d").is_some());
    }

    #[test]
    fn test_ttl_expiry() {
        let cache = EmbeddingCache::new(1024, Duration::from_millis(0));
        cache.put("k".to_string(), vec![1.0, 2.0]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_oversized_entry_not_cached() {
        let cache = cache(8);
        cache.put("big".to_string(), vec![0.0; 100]);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_is_content_hash() {
        let k1 = EmbeddingCache::key_for("same text");
        let k2 = EmbeddingCache::key_for("same text");
        let k3 = EmbeddingCache::key_for("other text");
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert_eq!(k1.len(), 64);
    }

    #[test]
    fn test_cached_embedder_hit_indistinguishable() {
        let inner = Arc::new(HashingEmbedder::new(64));
        let cached = CachedEmbedder::new(inner.clone(), 1024 * 1024, Duration::from_secs(60));

        let fresh = cached.embed("the quick brown fox").unwrap();
        let hit = cached.embed("the quick brown fox").unwrap();
        assert_eq!(fresh, hit);
        assert_eq!(cached.cache_stats().hits, 1);
    }
}
