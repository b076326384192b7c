//! In-memory resolved set: LRU of translations with TTL.
//! Key: blake3 hash of (src_lang | tgt_lang | text).

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;

use super::Language;
use crate::clock::Clock;

struct CacheEntry {
    translated_text: String,
    inserted_at: i64,
}

pub struct TranslationCache {
    inner: Mutex<LruCache<[u8; 32], CacheEntry>>,
    source: Language,
    ttl_ms: i64,
    clock: Arc<dyn Clock>,
}

impl TranslationCache {
    pub fn new(source: Language, capacity: usize, ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
            source,
            ttl_ms: ttl.as_millis() as i64,
            clock,
        }
    }

    /// Compute the cache key from translation parameters.
    pub fn compute_key(src_lang: Language, tgt_lang: Language, text: &str) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(src_lang.code().as_bytes());
        hasher.update(b"|");
        hasher.update(tgt_lang.code().as_bytes());
        hasher.update(b"|");
        hasher.update(text.as_bytes());
        *hasher.finalize().as_bytes()
    }

    /// Look up a resolved translation. Returns None if absent or expired.
    pub fn get(&self, target: Language, text: &str) -> Option<String> {
        let key = Self::compute_key(self.source, target, text);
        let now = self.clock.now_millis();
        let mut cache = self.inner.lock();
        if let Some(entry) = cache.get(&key) {
            if now - entry.inserted_at <= self.ttl_ms {
                return Some(entry.translated_text.clone());
            }
            cache.pop(&key);
        }
        None
    }

    pub fn insert(&self, target: Language, text: &str, translated_text: String) {
        let key = Self::compute_key(self.source, target, text);
        let inserted_at = self.clock.now_millis();
        self.inner.lock().put(
            key,
            CacheEntry {
                translated_text,
                inserted_at,
            },
        );
    }

    /// Drop every resolved translation (all languages).
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
