//! Durable SQLite store behind the persistent translation cache, the language
//! preference and the page cache.
//! Translation rows are keyed `{from}_{to}_{text}`, pages `{path}_{locale}`.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::Language;

/// A translation row as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    pub target: Language,
    pub text: String,
    pub translation: String,
    pub created_at: i64,
}

/// A translated page as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPage {
    pub path: String,
    pub locale: Language,
    pub content: BTreeMap<String, String>,
    pub last_updated: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError(format!("page content: {e}"))
    }
}

/// Durable side of the translation cache plus the preference slot.
pub trait CacheStore: Send + Sync {
    fn load_entries(&self, source: Language) -> Result<Vec<StoredEntry>, StoreError>;
    fn upsert_entries(&self, source: Language, entries: &[StoredEntry]) -> Result<(), StoreError>;
    fn delete_target(&self, source: Language, target: Language) -> Result<usize, StoreError>;
    /// Delete exactly the given `(target, text)` rows for `source`.
    fn delete_entries(&self, source: Language, keys: &[(Language, String)]) -> Result<usize, StoreError>;
    fn load_preference(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save_preference(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// Server-side cache of whole translated pages.
pub trait PageStore: Send + Sync {
    fn load_page(&self, path: &str, locale: Language) -> Result<Option<StoredPage>, StoreError>;
    fn save_page(&self, page: &StoredPage) -> Result<(), StoreError>;
    /// Mark every locale of `path` expired. Returns the number of pages touched.
    fn expire_path(&self, path: &str) -> Result<usize, StoreError>;
}

pub fn cache_key(from: Language, to: Language, text: &str) -> String {
    format!("{from}_{to}_{text}")
}

pub fn page_key(path: &str, locale: Language) -> String {
    format!("{path}_{locale}")
}

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)
            .map_err(|e| StoreError(format!("failed to open SQLite cache: {e}")))?;

        // WAL mode for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| StoreError(format!("PRAGMA failed: {e}")))?;

        let store = Self::init(conn)?;
        info!(path = %db_path.display(), "translation store opened");
        Ok(store)
    }

    /// Private in-memory database, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS translation_cache (
                cache_key TEXT PRIMARY KEY,
                src_lang TEXT NOT NULL,
                tgt_lang TEXT NOT NULL,
                source_text TEXT NOT NULL,
                translated_text TEXT NOT NULL,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_created
                ON translation_cache(created_at);
            CREATE TABLE IF NOT EXISTS preferences (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS page_translations (
                page_key TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                locale TEXT NOT NULL,
                content TEXT NOT NULL,
                last_updated INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_page_path
                ON page_translations(path);",
        )
        .map_err(|e| StoreError(format!("create tables failed: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CacheStore for SqliteStore {
    fn load_entries(&self, source: Language) -> Result<Vec<StoredEntry>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT tgt_lang, source_text, translated_text, created_at
             FROM translation_cache WHERE src_lang = ?1",
        )?;
        let rows = stmt.query_map(params![source.code()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (tgt, text, translation, created_at) = row?;
            match tgt.parse::<Language>() {
                Ok(target) => entries.push(StoredEntry {
                    target,
                    text,
                    translation,
                    created_at,
                }),
                Err(e) => warn!(error = %e, "skipping cache row with unknown language"),
            }
        }
        debug!(count = entries.len(), source = %source, "cache rows loaded");
        Ok(entries)
    }

    fn upsert_entries(&self, source: Language, entries: &[StoredEntry]) -> Result<(), StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO translation_cache
                 (cache_key, src_lang, tgt_lang, source_text, translated_text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in entries {
                stmt.execute(params![
                    cache_key(source, entry.target, &entry.text),
                    source.code(),
                    entry.target.code(),
                    entry.text,
                    entry.translation,
                    entry.created_at,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_target(&self, source: Language, target: Language) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let removed = conn.execute(
            "DELETE FROM translation_cache WHERE src_lang = ?1 AND tgt_lang = ?2",
            params![source.code(), target.code()],
        )?;
        Ok(removed)
    }

    fn delete_entries(&self, source: Language, keys: &[(Language, String)]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM translation_cache WHERE cache_key = ?1")?;
            for (target, text) in keys {
                removed += stmt.execute(params![cache_key(source, *target, text)])?;
            }
        }
        tx.commit()?;
        if removed > 0 {
            debug!(removed, "translation store rows evicted");
        }
        Ok(removed)
    }

    fn load_preference(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM preferences WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn save_preference(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO preferences (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }
}

impl PageStore for SqliteStore {
    fn load_page(&self, path: &str, locale: Language) -> Result<Option<StoredPage>, StoreError> {
        let conn = self.conn.lock();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT content, last_updated FROM page_translations WHERE page_key = ?1",
                params![page_key(path, locale)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((content, last_updated)) => Ok(Some(StoredPage {
                path: path.to_string(),
                locale,
                content: serde_json::from_str(&content)?,
                last_updated,
            })),
            None => Ok(None),
        }
    }

    fn save_page(&self, page: &StoredPage) -> Result<(), StoreError> {
        let content = serde_json::to_string(&page.content)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO page_translations
             (page_key, path, locale, content, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                page_key(&page.path, page.locale),
                page.path,
                page.locale.code(),
                content,
                page.last_updated,
            ],
        )?;
        Ok(())
    }

    fn expire_path(&self, path: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock();
        let touched = conn.execute(
            "UPDATE page_translations SET last_updated = 0 WHERE path = ?1",
            params![path],
        )?;
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(target: Language, text: &str, translation: &str, created_at: i64) -> StoredEntry {
        StoredEntry {
            target,
            text: text.into(),
            translation: translation.into(),
            created_at,
        }
    }

    #[test]
    fn keys_follow_wire_format() {
        assert_eq!(cache_key(Language::En, Language::Es, "Hi there"), "EN_ES_Hi there");
        assert_eq!(page_key("/dashboard", Language::Fr), "/dashboard_FR");
    }

    #[test]
    fn upsert_overwrites_and_loads_per_source() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_entries(Language::En, &[entry(Language::Es, "Save", "Salvar", 1)])
            .unwrap();
        store
            .upsert_entries(Language::En, &[entry(Language::Es, "Save", "Guardar", 2)])
            .unwrap();
        store
            .upsert_entries(Language::Fr, &[entry(Language::Es, "Sauver", "Guardar", 3)])
            .unwrap();

        let rows = store.load_entries(Language::En).unwrap();
        assert_eq!(rows, vec![entry(Language::Es, "Save", "Guardar", 2)]);
    }

    #[test]
    fn delete_target_only_touches_that_language() {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .upsert_entries(
                Language::En,
                &[
                    entry(Language::Es, "Save", "Guardar", 1),
                    entry(Language::Fr, "Save", "Enregistrer", 1),
                ],
            )
            .unwrap();
        assert_eq!(store.delete_target(Language::En, Language::Es).unwrap(), 1);
        let rows = store.load_entries(Language::En).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].target, Language::Fr);
    }

    #[test]
    fn delete_entries_removes_only_named_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rows: Vec<StoredEntry> = (0..4)
            .map(|i| entry(Language::De, &format!("t{i}"), &format!("d{i}"), i))
            .collect();
        store.upsert_entries(Language::En, &rows).unwrap();
        let victims = vec![(Language::De, "t1".to_string()), (Language::Fr, "t2".to_string())];
        assert_eq!(store.delete_entries(Language::En, &victims).unwrap(), 1);
        let mut kept: Vec<String> = store
            .load_entries(Language::En)
            .unwrap()
            .into_iter()
            .map(|e| e.text)
            .collect();
        kept.sort();
        assert_eq!(kept, vec!["t0", "t2", "t3"]);
    }

    #[test]
    fn preferences_round_trip() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.load_preference("preferred_language").unwrap(), None);
        store.save_preference("preferred_language", "JA").unwrap();
        store.save_preference("preferred_language", "KO").unwrap();
        assert_eq!(
            store.load_preference("preferred_language").unwrap().as_deref(),
            Some("KO")
        );
    }

    #[test]
    fn pages_expire_by_path() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut content = BTreeMap::new();
        content.insert("title".to_string(), "Bienvenido".to_string());
        for locale in [Language::Es, Language::De] {
            store
                .save_page(&StoredPage {
                    path: "/home".into(),
                    locale,
                    content: content.clone(),
                    last_updated: 500,
                })
                .unwrap();
        }

        let page = store.load_page("/home", Language::Es).unwrap().unwrap();
        assert_eq!(page.content, content);
        assert_eq!(page.last_updated, 500);

        assert_eq!(store.expire_path("/home").unwrap(), 2);
        let page = store.load_page("/home", Language::De).unwrap().unwrap();
        assert_eq!(page.last_updated, 0);
        assert!(store.load_page("/other", Language::De).unwrap().is_none());
    }

    #[test]
    fn file_backed_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .upsert_entries(Language::En, &[entry(Language::Zh, "Save", "保存", 7)])
                .unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let rows = store.load_entries(Language::En).unwrap();
        assert_eq!(rows, vec![entry(Language::Zh, "Save", "保存", 7)]);
    }
}
