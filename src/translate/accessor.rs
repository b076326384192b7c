//! Reactive accessor: the synchronous `translate` callers render with.
//!
//! A lookup never blocks and never fails. Hits come from the resolved set or
//! the persistent cache; a miss is handed to the coalescer and answered with
//! the source text for now. When a queued text settles the revision counter
//! moves, and subscribers re-render to pick up the translation.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::cache::TranslationCache;
use super::store::CacheStore;
use super::{Coalescer, Language, PersistentCache, Resolution};

/// Preference slot holding the active UI language.
pub const PREFERRED_LANGUAGE_KEY: &str = "preferred_language";

#[derive(Default)]
struct Tracking {
    /// Texts handed to the coalescer and not yet settled.
    queued: HashSet<(Language, String)>,
    /// Texts whose batch fell back; not re-queued until the next language switch.
    failed: HashSet<(Language, String)>,
}

/// State touched from batch callbacks.
struct Shared {
    resolved: TranslationCache,
    tracking: Mutex<Tracking>,
    revision: watch::Sender<u64>,
}

impl Shared {
    fn settle(&self, target: Language, text: String, resolution: Resolution) {
        let key = (target, text);
        {
            let mut tracking = self.tracking.lock();
            tracking.queued.remove(&key);
            if resolution.is_err() {
                tracking.failed.insert(key.clone());
            }
        }
        match resolution {
            Ok(translation) => self.resolved.insert(target, &key.1, translation),
            Err(fallback) => {
                debug!(language = %target, reason = %fallback.reason, "showing source text");
            }
        }
        self.revision.send_modify(|rev| *rev += 1);
    }
}

pub struct TranslationAccessor {
    source: Language,
    current: RwLock<Language>,
    shared: Arc<Shared>,
    persistent: Arc<PersistentCache>,
    coalescer: Arc<Coalescer>,
    store: Arc<dyn CacheStore>,
}

impl TranslationAccessor {
    /// `resolved` is the in-memory set; the active language is read from `store`.
    pub fn new(
        source: Language,
        resolved: TranslationCache,
        persistent: Arc<PersistentCache>,
        coalescer: Arc<Coalescer>,
        store: Arc<dyn CacheStore>,
    ) -> Self {
        let current = match store.load_preference(PREFERRED_LANGUAGE_KEY) {
            Ok(Some(code)) => code.parse::<Language>().unwrap_or_else(|e| {
                warn!(error = %e, "ignoring stored language preference");
                source
            }),
            Ok(None) => source,
            Err(e) => {
                warn!(error = %e, "language preference unavailable");
                source
            }
        };
        info!(language = %current, "translation accessor ready");

        let (revision, _) = watch::channel(0);
        Self {
            source,
            current: RwLock::new(current),
            shared: Arc::new(Shared {
                resolved,
                tracking: Mutex::new(Tracking::default()),
                revision,
            }),
            persistent,
            coalescer,
            store,
        }
    }

    /// Best-effort translation of `text`; `target` defaults to the active language.
    pub fn translate(&self, text: &str, target: Option<Language>) -> String {
        let target = target.unwrap_or_else(|| self.language());
        if target == self.source {
            return text.to_string();
        }

        if let Some(hit) = self.shared.resolved.get(target, text) {
            return hit;
        }
        if let Some(hit) = self.persistent.get(text, target) {
            self.shared.resolved.insert(target, text, hit.clone());
            return hit;
        }

        let key = (target, text.to_string());
        {
            let mut tracking = self.shared.tracking.lock();
            if tracking.failed.contains(&key) || !tracking.queued.insert(key.clone()) {
                return text.to_string();
            }
        }

        let shared = Arc::clone(&self.shared);
        let owned = key.1.clone();
        self.coalescer.enqueue(
            key.1,
            target,
            Box::new(move |resolution| shared.settle(target, owned, resolution)),
        );
        text.to_string()
    }

    pub fn language(&self) -> Language {
        *self.current.read()
    }

    pub fn source_language(&self) -> Language {
        self.source
    }

    /// Switch the active language: persist it and invalidate cached strings for it.
    pub fn set_language(&self, language: Language) {
        let previous = std::mem::replace(&mut *self.current.write(), language);
        if previous == language {
            return;
        }

        if let Err(e) = self
            .store
            .save_preference(PREFERRED_LANGUAGE_KEY, language.code())
        {
            warn!(error = %e, "failed to persist language preference");
        }
        self.persistent.clear(language);
        self.shared.resolved.clear();
        self.shared.tracking.lock().failed.clear();
        self.shared.revision.send_modify(|rev| *rev += 1);
        info!(from = %previous, to = %language, "language switched");
    }

    /// Revision counter that moves whenever displayed strings may have changed.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.shared.revision.borrow()
    }

    /// Whether `text` is waiting on a batch for `target`.
    pub fn is_queued(&self, text: &str, target: Language) -> bool {
        self.shared
            .tracking
            .lock()
            .queued
            .contains(&(target, text.to_string()))
    }
}
