//! Gateway client: the only path to a translation provider.
//! Identity short-circuit, language mapping, sequential chunking, a rolling
//! request window, per-call timeout and exponential backoff on transient errors.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Language, TranslateError, TranslationProvider};
use crate::config::GatewayConfig;
use crate::metrics::{metric_names, MetricsRegistry};
use crate::rate_limit::RollingWindow;

pub struct GatewayClient {
    provider: Arc<dyn TranslationProvider>,
    config: GatewayConfig,
    window: Mutex<RollingWindow>,
    metrics: Arc<MetricsRegistry>,
}

impl GatewayClient {
    pub fn new(
        provider: Arc<dyn TranslationProvider>,
        config: GatewayConfig,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        let window = RollingWindow::new(
            config.requests_per_window,
            Duration::from_secs(config.window_secs),
        );
        Self {
            provider,
            config,
            window: Mutex::new(window),
            metrics,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Translate `texts`, returning one string per input in input order.
    pub async fn translate_batch(
        &self,
        texts: &[String],
        from: Language,
        to: Language,
    ) -> Result<Vec<String>, TranslateError> {
        if from == to {
            return Ok(texts.to_vec());
        }
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let from_code = self.map_language(from)?;
        let to_code = self.map_language(to)?;

        let _timer = self.metrics.timer(metric_names::GATEWAY_BATCH);
        let chunk_size = self.config.max_chunk.max(1);
        let chunk_count = texts.len().div_ceil(chunk_size);
        let mut out = Vec::with_capacity(texts.len());

        for (idx, chunk) in texts.chunks(chunk_size).enumerate() {
            if idx > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.chunk_delay_ms)).await;
            }
            debug!(
                provider = self.provider.name(),
                chunk = idx + 1,
                of = chunk_count,
                texts = chunk.len(),
                "sending chunk"
            );
            let translated = self.send_with_retry(chunk, from_code, to_code).await?;
            out.extend(translated);
        }

        info!(
            provider = self.provider.name(),
            from = %from,
            to = %to,
            texts = texts.len(),
            chunks = chunk_count,
            "batch translated"
        );
        Ok(out)
    }

    fn map_language(&self, lang: Language) -> Result<&'static str, TranslateError> {
        self.provider.language_code(lang).ok_or_else(|| {
            warn!(provider = self.provider.name(), language = %lang, "no provider code for language");
            TranslateError::UnsupportedLanguage(lang.code().to_string())
        })
    }

    /// Wait until the rolling window admits another request.
    async fn rate_limit_wait(&self) {
        loop {
            let wait = match self.window.lock().try_acquire(Instant::now()) {
                Ok(()) => return,
                Err(wait) => wait,
            };
            debug!(wait_ms = wait.as_millis() as u64, "request window full, waiting");
            tokio::time::sleep(wait).await;
        }
    }

    /// One chunk, retried on transient errors with exponential backoff.
    async fn send_with_retry(
        &self,
        chunk: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, TranslateError> {
        let timeout = Duration::from_secs(self.config.request_timeout_secs);
        let mut attempt: u32 = 0;

        loop {
            self.rate_limit_wait().await;

            let timer = self.metrics.timer(metric_names::PROVIDER_CALL);
            let result = match tokio::time::timeout(timeout, self.provider.translate(chunk, from, to)).await {
                Ok(result) => result,
                Err(_) => Err(TranslateError::Timeout),
            };
            drop(timer);

            let result = result.and_then(|translations| {
                if translations.len() == chunk.len() {
                    Ok(translations)
                } else {
                    Err(TranslateError::Malformed(format!(
                        "expected {} translations, got {}",
                        chunk.len(),
                        translations.len()
                    )))
                }
            });

            match result {
                Ok(translations) => {
                    self.metrics
                        .record(metric_names::PROVIDER_RETRIES, attempt as f64);
                    return Ok(translations);
                }
                Err(e) if e.is_transient() && attempt < self.config.max_retries => {
                    let wait = e
                        .retry_after()
                        .unwrap_or_else(|| self.backoff(attempt))
                        .min(Duration::from_millis(self.config.max_retry_wait_ms));
                    warn!(
                        provider = self.provider.name(),
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        error = %e,
                        "transient provider error, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(TranslateError::RetriesExhausted {
                        attempts: attempt + 1,
                        last: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << attempt.min(16);
        Duration::from_millis(self.config.base_backoff_ms.saturating_mul(factor))
    }
}
