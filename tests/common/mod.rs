#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use batch_translate::clock::ManualClock;
use batch_translate::config::{Config, GatewayConfig};
use batch_translate::translate::store::SqliteStore;
use batch_translate::translate::{Language, TranslateError, TranslationProvider, TranslationService};

pub const EPOCH_MS: i64 = 1_700_000_000_000;

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub texts: Vec<String>,
    pub from: String,
    pub to: String,
}

/// Scripted provider: answers `"{to}:{text}"` unless told otherwise.
pub struct MockProvider {
    calls: Mutex<Vec<Call>>,
    /// Errors returned by the next calls, in order.
    script: Mutex<VecDeque<TranslateError>>,
    /// Returned by every call once the script is empty.
    always: Mutex<Option<TranslateError>>,
    unmapped: Option<Language>,
    delay: Duration,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            always: Mutex::new(None),
            unmapped: None,
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn without_language(mut self, lang: Language) -> Self {
        self.unmapped = Some(lang);
        self
    }

    pub fn fail_next(&self, err: TranslateError) {
        self.script.lock().push_back(err);
    }

    pub fn fail_always(&self, err: TranslateError) {
        *self.always.lock() = Some(err);
    }

    pub fn recover(&self) {
        *self.always.lock() = None;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn language_code(&self, lang: Language) -> Option<&'static str> {
        if Some(lang) == self.unmapped {
            None
        } else {
            Some(lang.code())
        }
    }

    async fn translate(
        &self,
        texts: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, TranslateError> {
        self.calls.lock().push(Call {
            texts: texts.to_vec(),
            from: from.to_string(),
            to: to.to_string(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(err) = self.script.lock().pop_front() {
            return Err(err);
        }
        if let Some(err) = self.always.lock().clone() {
            return Err(err);
        }
        Ok(texts.iter().map(|t| format!("{to}:{t}")).collect())
    }
}

pub fn strings(texts: &[&str]) -> Vec<String> {
    texts.iter().map(|t| t.to_string()).collect()
}

/// Gateway limits that never throttle unless a test asks for it.
pub fn gateway_config() -> GatewayConfig {
    GatewayConfig {
        requests_per_window: 1_000,
        ..GatewayConfig::default()
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.gateway = gateway_config();
    config
}

pub struct Harness {
    pub service: TranslationService,
    pub provider: Arc<MockProvider>,
    pub store: Arc<SqliteStore>,
    pub clock: Arc<ManualClock>,
}

/// Full pipeline on an in-memory store and a manual wall clock.
pub fn harness(config: &Config, provider: MockProvider) -> Harness {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    harness_with_store(config, provider, store, Arc::new(ManualClock::new(EPOCH_MS)))
}

pub fn harness_with_store(
    config: &Config,
    provider: MockProvider,
    store: Arc<SqliteStore>,
    clock: Arc<ManualClock>,
) -> Harness {
    let provider = Arc::new(provider);
    let service = TranslationService::build(
        config,
        provider.clone(),
        Arc::clone(&store),
        clock.clone(),
        tokio::runtime::Handle::current(),
    );
    Harness {
        service,
        provider,
        store,
        clock,
    }
}

/// Let one batch window elapse and the resulting batch settle.
pub async fn settle(config: &Config) {
    tokio::time::sleep(Duration::from_millis(config.batch.window_ms + 50)).await;
}
