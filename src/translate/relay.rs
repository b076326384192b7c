//! Provider that calls another instance's `POST /translate`.
//! This is the client half of the server in `crate::server`: the caller keeps
//! its own caches and coalescer while the relay holds the DeepL credentials.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::deepl::{classify_status, classify_transport, retry_after_ms};
use super::{Language, TranslateError, TranslationProvider};

pub struct RelayProvider {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    texts: &'a [String],
    from: &'a str,
    to: &'a str,
}

#[derive(Deserialize)]
struct RelayResponse {
    translations: Option<Vec<String>>,
}

#[derive(Deserialize)]
struct RelayErrorBody {
    error: String,
    details: Option<String>,
}

impl RelayProvider {
    /// `base_url` without the `/translate` suffix, e.g. `http://127.0.0.1:4000`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, TranslateError> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(timeout)
            .build()
            .map_err(|e| TranslateError::Network(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: format!("{}/translate", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl TranslationProvider for RelayProvider {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn language_code(&self, lang: Language) -> Option<&'static str> {
        Some(lang.code())
    }

    async fn translate(
        &self,
        texts: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, TranslateError> {
        debug!(endpoint = %self.endpoint, texts = texts.len(), "relay request");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&RelayRequest { texts, from, to })
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            let body: RelayResponse = response
                .json()
                .await
                .map_err(|e| TranslateError::Malformed(e.to_string()))?;
            return body
                .translations
                .ok_or_else(|| TranslateError::Malformed("missing translations array".into()));
        }

        let retry_after = retry_after_ms(response.headers());
        let raw = response.text().await.unwrap_or_default();
        let message = match serde_json::from_str::<RelayErrorBody>(&raw) {
            Ok(body) => match body.details {
                Some(details) => format!("{}: {}", body.error, details),
                None => body.error,
            },
            Err(_) => raw,
        };
        let err = classify_status(status, retry_after, &message);
        warn!(status = status.as_u16(), error = %err, "relay request failed");
        Err(err)
    }
}
