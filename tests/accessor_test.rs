mod common;

use std::sync::Arc;
use std::time::Duration;

use batch_translate::clock::ManualClock;
use batch_translate::translate::accessor::PREFERRED_LANGUAGE_KEY;
use batch_translate::translate::store::{CacheStore, SqliteStore};
use batch_translate::translate::{Language, TranslateError};

use common::{harness, harness_with_store, settle, test_config, MockProvider, EPOCH_MS};

#[tokio::test(start_paused = true)]
async fn source_language_is_identity() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());

    assert_eq!(h.service.accessor.language(), Language::En);
    assert_eq!(h.service.accessor.translate("Hello", None), "Hello");

    settle(&config).await;
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn miss_returns_placeholder_then_translation() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());
    let accessor = &h.service.accessor;
    accessor.set_language(Language::Es);
    let mut revisions = accessor.subscribe();
    revisions.borrow_and_update();

    assert_eq!(accessor.translate("Save", None), "Save");
    assert_eq!(accessor.translate("Cancel", None), "Cancel");
    assert!(accessor.is_queued("Save", Language::Es));

    settle(&config).await;

    assert!(revisions.has_changed().unwrap());
    assert_eq!(accessor.translate("Save", None), "ES:Save");
    assert_eq!(accessor.translate("Cancel", None), "ES:Cancel");
    assert!(!accessor.is_queued("Save", Language::Es));
    assert_eq!(h.provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_misses_do_not_requeue() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());
    let accessor = &h.service.accessor;

    for _ in 0..5 {
        accessor.translate("Save", Some(Language::Fr));
    }
    assert_eq!(h.service.coalescer.pending_len(Language::Fr), 1);

    settle(&config).await;
    assert_eq!(h.provider.calls()[0].texts, vec!["Save"]);
    assert_eq!(accessor.translate("Save", Some(Language::Fr)), "FR:Save");
}

#[tokio::test(start_paused = true)]
async fn explicit_target_overrides_active_language() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());

    h.service.accessor.translate("Hello", Some(Language::De));
    settle(&config).await;

    assert_eq!(h.service.accessor.language(), Language::En);
    assert_eq!(h.service.accessor.translate("Hello", Some(Language::De)), "DE:Hello");
    assert_eq!(h.service.accessor.translate("Hello", None), "Hello");
}

#[tokio::test(start_paused = true)]
async fn failed_text_keeps_source_until_language_switch() {
    let config = test_config();
    let provider = MockProvider::new();
    provider.fail_always(TranslateError::Rejected {
        status: 456,
        message: "quota exceeded".into(),
    });
    let h = harness(&config, provider);
    let accessor = &h.service.accessor;
    accessor.set_language(Language::Es);

    assert_eq!(accessor.translate("Hello", None), "Hello");
    settle(&config).await;
    assert_eq!(accessor.translate("Hello", None), "Hello");
    settle(&config).await;
    assert_eq!(h.provider.call_count(), 1);

    h.provider.recover();
    accessor.set_language(Language::Fr);
    accessor.set_language(Language::Es);
    assert_eq!(accessor.translate("Hello", None), "Hello");
    settle(&config).await;
    assert_eq!(accessor.translate("Hello", None), "ES:Hello");
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_leave_source_text() {
    let config = test_config();
    let provider = MockProvider::new();
    provider.fail_always(TranslateError::RateLimited { retry_after_ms: None });
    let h = harness(&config, provider);
    let accessor = &h.service.accessor;

    assert_eq!(accessor.translate("Hello", Some(Language::Es)), "Hello");
    settle(&config).await;
    assert!(accessor.is_queued("Hello", Language::Es));
    assert_eq!(accessor.translate("Hello", Some(Language::Es)), "Hello");

    // 1s + 2s + 4s of backoff with the default schedule.
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(accessor.translate("Hello", Some(Language::Es)), "Hello");
    assert!(!accessor.is_queued("Hello", Language::Es));
    let attempts = config.gateway.max_retries as usize + 1;
    assert_eq!(h.provider.call_count(), attempts);

    settle(&config).await;
    assert_eq!(h.provider.call_count(), attempts);
}

#[tokio::test(start_paused = true)]
async fn persistent_hit_skips_provider() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());
    h.service.persistent.put(
        &["Hello".to_string()],
        &["Hola".to_string()],
        Language::Es,
    );

    assert_eq!(h.service.accessor.translate("Hello", Some(Language::Es)), "Hola");
    settle(&config).await;
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn switching_language_clears_its_cached_entries() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());
    let accessor = &h.service.accessor;
    h.service.persistent.put(&["Hello".to_string()], &["Hola".to_string()], Language::Es);
    h.service.persistent.put(&["Hello".to_string()], &["Bonjour".to_string()], Language::Fr);

    let before = accessor.revision();
    accessor.set_language(Language::Es);

    assert!(accessor.revision() > before);
    assert_eq!(h.service.persistent.get("Hello", Language::Es), None);
    assert_eq!(
        h.service.persistent.get("Hello", Language::Fr).as_deref(),
        Some("Bonjour")
    );
    // Refetched through the provider rather than served stale.
    assert_eq!(accessor.translate("Hello", None), "Hello");
    settle(&config).await;
    assert_eq!(accessor.translate("Hello", None), "ES:Hello");
}

#[tokio::test(start_paused = true)]
async fn same_language_switch_is_a_no_op() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());
    h.service.accessor.set_language(Language::Ja);
    let revision = h.service.accessor.revision();

    h.service.accessor.set_language(Language::Ja);
    assert_eq!(h.service.accessor.revision(), revision);
}

#[tokio::test(start_paused = true)]
async fn language_preference_survives_restart() {
    let config = test_config();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.db");

    {
        let store = Arc::new(SqliteStore::open(&path).unwrap());
        let h = harness_with_store(
            &config,
            MockProvider::new(),
            store,
            Arc::new(ManualClock::new(EPOCH_MS)),
        );
        h.service.accessor.set_language(Language::Ko);
        h.service.accessor.translate("Welcome", None);
        settle(&config).await;
    }

    let store = Arc::new(SqliteStore::open(&path).unwrap());
    assert_eq!(
        store.load_preference(PREFERRED_LANGUAGE_KEY).unwrap().as_deref(),
        Some("KO")
    );
    let h = harness_with_store(
        &config,
        MockProvider::new(),
        store,
        Arc::new(ManualClock::new(EPOCH_MS + 1_000)),
    );
    assert_eq!(h.service.accessor.language(), Language::Ko);
    assert_eq!(h.service.accessor.translate("Welcome", None), "KO:Welcome");
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_fetched_again() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());
    h.service.persistent.put(&["Hello".to_string()], &["Hola".to_string()], Language::Es);

    h.clock.advance(Duration::from_secs(config.cache.ttl_secs + 1));

    assert_eq!(h.service.accessor.translate("Hello", Some(Language::Es)), "Hello");
    settle(&config).await;
    assert_eq!(h.provider.call_count(), 1);
    assert_eq!(h.service.accessor.translate("Hello", Some(Language::Es)), "ES:Hello");
}
