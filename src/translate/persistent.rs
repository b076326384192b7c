//! Persistent translation cache: an in-memory map mirrored to a durable store.
//! Entries older than the TTL read as absent and are never swept proactively.
//! Store failures are logged and swallowed; after the first one the cache
//! runs memory-only for the rest of the session.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::store::{CacheStore, StoreError, StoredEntry};
use super::Language;
use crate::clock::Clock;

#[derive(Debug, Clone)]
struct CacheEntry {
    translation: String,
    created_at: i64,
}

pub struct PersistentCache {
    entries: Mutex<HashMap<Language, HashMap<String, CacheEntry>>>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    source: Language,
    ttl_ms: i64,
    max_entries: usize,
    degraded: AtomicBool,
}

impl PersistentCache {
    /// Load the durable rows for `source`, dropping expired ones.
    pub fn open(
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        source: Language,
        ttl: Duration,
        max_entries: usize,
    ) -> Self {
        let cache = Self {
            entries: Mutex::new(HashMap::new()),
            store,
            clock,
            source,
            ttl_ms: ttl.as_millis() as i64,
            max_entries: max_entries.max(1),
            degraded: AtomicBool::new(false),
        };

        match cache.store.load_entries(source) {
            Ok(rows) => {
                let now = cache.clock.now_millis();
                let mut entries = cache.entries.lock();
                let mut loaded = 0usize;
                for row in rows {
                    if now - row.created_at > cache.ttl_ms {
                        continue;
                    }
                    entries.entry(row.target).or_default().insert(
                        row.text,
                        CacheEntry {
                            translation: row.translation,
                            created_at: row.created_at,
                        },
                    );
                    loaded += 1;
                }
                info!(loaded, source = %source, "persistent cache loaded");
            }
            Err(e) => cache.degrade("load", &e),
        }

        cache
    }

    /// Cached translation of `text` into `target`, if present and fresh.
    pub fn get(&self, text: &str, target: Language) -> Option<String> {
        let now = self.clock.now_millis();
        let entries = self.entries.lock();
        let entry = entries.get(&target)?.get(text)?;
        if now - entry.created_at > self.ttl_ms {
            return None;
        }
        Some(entry.translation.clone())
    }

    /// Store positionally aligned translations, overwriting with a fresh timestamp.
    pub fn put(&self, texts: &[String], translations: &[String], target: Language) {
        if texts.len() != translations.len() {
            warn!(
                texts = texts.len(),
                translations = translations.len(),
                "cache put with misaligned arrays, ignoring"
            );
            return;
        }
        if texts.is_empty() {
            return;
        }

        let now = self.clock.now_millis();
        let rows: Vec<StoredEntry> = texts
            .iter()
            .zip(translations)
            .map(|(text, translation)| StoredEntry {
                target,
                text: text.clone(),
                translation: translation.clone(),
                created_at: now,
            })
            .collect();

        let evicted = {
            let mut entries = self.entries.lock();
            let lang_entries = entries.entry(target).or_default();
            for row in &rows {
                lang_entries.insert(
                    row.text.clone(),
                    CacheEntry {
                        translation: row.translation.clone(),
                        created_at: now,
                    },
                );
            }
            evict_oldest(&mut entries, self.max_entries)
        };

        self.persist(|store| store.upsert_entries(self.source, &rows));
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "persistent cache over capacity");
            self.persist(|store| store.delete_entries(self.source, &evicted).map(|_| ()));
        }
    }

    /// Drop every entry for `target`, in memory and in the store.
    pub fn clear(&self, target: Language) {
        let removed = self
            .entries
            .lock()
            .remove(&target)
            .map(|m| m.len())
            .unwrap_or(0);
        self.persist(|store| store.delete_target(self.source, target).map(|_| ()));
        info!(target = %target, removed, "persistent cache cleared");
    }

    /// True once a store operation has failed this session.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn persist<F>(&self, op: F)
    where
        F: FnOnce(&dyn CacheStore) -> Result<(), StoreError>,
    {
        if self.is_degraded() {
            return;
        }
        if let Err(e) = op(self.store.as_ref()) {
            self.degrade("write", &e);
        }
    }

    fn degrade(&self, op: &str, error: &StoreError) {
        if !self.degraded.swap(true, Ordering::SeqCst) {
            warn!(op, error = %error, "cache store failed, continuing memory-only");
        }
    }
}

/// Remove the oldest entries until at most `max` remain and return them.
/// Ties on age break by language then text, so the store can drop the same rows.
fn evict_oldest(
    entries: &mut HashMap<Language, HashMap<String, CacheEntry>>,
    max: usize,
) -> Vec<(Language, String)> {
    let total: usize = entries.values().map(HashMap::len).sum();
    if total <= max {
        return Vec::new();
    }

    let mut ages: Vec<(i64, Language, &String)> = entries
        .iter()
        .flat_map(|(lang, map)| map.iter().map(move |(text, entry)| (entry.created_at, *lang, text)))
        .collect();
    ages.sort_unstable();

    let victims: Vec<(Language, String)> = ages
        .into_iter()
        .take(total - max)
        .map(|(_, lang, text)| (lang, text.clone()))
        .collect();
    for (lang, text) in &victims {
        if let Some(map) = entries.get_mut(lang) {
            map.remove(text);
        }
    }
    victims
}
