//! Whole-page translation backed by the page store.
//! A page is a map of content keys to source strings, translated in one
//! gateway call and cached under `{path}_{locale}`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::store::{PageStore, StoredPage};
use super::{GatewayClient, Language};
use crate::clock::Clock;

pub struct PageTranslator {
    store: Arc<dyn PageStore>,
    gateway: Arc<GatewayClient>,
    clock: Arc<dyn Clock>,
    source: Language,
    ttl_ms: i64,
}

impl PageTranslator {
    pub fn new(
        store: Arc<dyn PageStore>,
        gateway: Arc<GatewayClient>,
        clock: Arc<dyn Clock>,
        source: Language,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            gateway,
            clock,
            source,
            ttl_ms: ttl.as_millis() as i64,
        }
    }

    /// Cached page content if present and younger than the TTL.
    pub fn cached_page(&self, path: &str, locale: Language) -> Option<BTreeMap<String, String>> {
        match self.store.load_page(path, locale) {
            Ok(Some(page)) => {
                let age = self.clock.now_millis() - page.last_updated;
                if age > self.ttl_ms {
                    debug!(path, locale = %locale, "page cache expired");
                    None
                } else {
                    Some(page.content)
                }
            }
            Ok(None) => None,
            Err(e) => {
                warn!(path, error = %e, "page cache read failed");
                None
            }
        }
    }

    pub fn store_page(&self, path: &str, locale: Language, content: &BTreeMap<String, String>) {
        let page = StoredPage {
            path: path.to_string(),
            locale,
            content: content.clone(),
            last_updated: self.clock.now_millis(),
        };
        if let Err(e) = self.store.save_page(&page) {
            warn!(path, error = %e, "page cache write failed");
        }
    }

    /// Expire every cached locale of `path`.
    pub fn invalidate_path(&self, path: &str) {
        match self.store.expire_path(path) {
            Ok(touched) => info!(path, touched, "page cache invalidated"),
            Err(e) => warn!(path, error = %e, "page cache invalidation failed"),
        }
    }

    /// Translated content for `path`, falling back to `defaults` on any failure.
    pub async fn translate_page(
        &self,
        path: &str,
        locale: Language,
        defaults: &BTreeMap<String, String>,
    ) -> BTreeMap<String, String> {
        if locale == self.source {
            return defaults.clone();
        }
        if let Some(cached) = self.cached_page(path, locale) {
            return cached;
        }

        let (keys, texts): (Vec<&String>, Vec<String>) =
            defaults.iter().map(|(k, v)| (k, v.clone())).unzip();

        match self.gateway.translate_batch(&texts, self.source, locale).await {
            Ok(translations) => {
                let content: BTreeMap<String, String> = keys
                    .into_iter()
                    .cloned()
                    .zip(translations)
                    .collect();
                self.store_page(path, locale, &content);
                info!(path, locale = %locale, entries = content.len(), "page translated");
                content
            }
            Err(e) => {
                warn!(path, locale = %locale, error = %e, "page translation failed, using defaults");
                defaults.clone()
            }
        }
    }
}
