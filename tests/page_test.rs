mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use batch_translate::translate::{Language, TranslateError};

use common::{harness, test_config, MockProvider};

fn defaults() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("cta".to_string(), "Get started".to_string()),
        ("title".to_string(), "Welcome".to_string()),
    ])
}

#[tokio::test(start_paused = true)]
async fn translates_page_once_then_serves_cache() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());
    let pages = &h.service.pages;

    let first = pages.translate_page("/home", Language::Fr, &defaults()).await;
    assert_eq!(first["title"], "FR:Welcome");
    assert_eq!(first["cta"], "FR:Get started");

    let second = pages.translate_page("/home", Language::Fr, &defaults()).await;
    assert_eq!(second, first);
    assert_eq!(h.provider.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn source_locale_returns_defaults() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());

    let page = h.service.pages.translate_page("/home", Language::En, &defaults()).await;

    assert_eq!(page, defaults());
    assert_eq!(h.provider.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn failure_returns_defaults_and_caches_nothing() {
    let config = test_config();
    let provider = MockProvider::new();
    provider.fail_always(TranslateError::Rejected {
        status: 403,
        message: "forbidden".into(),
    });
    let h = harness(&config, provider);

    let page = h.service.pages.translate_page("/home", Language::De, &defaults()).await;

    assert_eq!(page, defaults());
    assert!(h.service.pages.cached_page("/home", Language::De).is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_and_invalidated_pages_are_refetched() {
    let config = test_config();
    let h = harness(&config, MockProvider::new());
    let pages = &h.service.pages;

    pages.translate_page("/home", Language::Es, &defaults()).await;
    pages.translate_page("/about", Language::Es, &defaults()).await;
    assert_eq!(h.provider.call_count(), 2);

    pages.invalidate_path("/home");
    assert!(pages.cached_page("/home", Language::Es).is_none());
    assert!(pages.cached_page("/about", Language::Es).is_some());

    pages.translate_page("/home", Language::Es, &defaults()).await;
    assert_eq!(h.provider.call_count(), 3);

    h.clock.advance(Duration::from_secs(config.cache.ttl_secs + 1));
    assert!(pages.cached_page("/about", Language::Es).is_none());
}
