//! DeepL translation provider.
//! Connection pooling via reqwest, form-encoded batch requests, status → error
//! classification. Retry and pacing live in the gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use super::language::deepl_code;
use super::{Language, TranslateError, TranslationProvider};
use crate::config::ProviderConfig;

pub struct DeepLProvider {
    http: reqwest::Client,
    api_key: String,
    api_url: String,
}

impl DeepLProvider {
    /// Build from config; fails fast without an API key.
    pub fn new(config: &ProviderConfig) -> Result<Self, TranslateError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| TranslateError::InvalidInput("DEEPL_API_KEY is not set".into()))?;

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TranslateError::Network(e.to_string()))?;

        Ok(Self {
            http,
            api_key,
            api_url: config.api_url.clone(),
        })
    }
}

#[async_trait]
impl TranslationProvider for DeepLProvider {
    fn name(&self) -> &'static str {
        "deepl"
    }

    fn language_code(&self, lang: Language) -> Option<&'static str> {
        deepl_code(lang)
    }

    async fn translate(
        &self,
        texts: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, TranslateError> {
        let form = build_form(texts, from, to);
        debug!(texts = texts.len(), from, to, "deepl request");

        let response = self
            .http
            .post(&self.api_url)
            .header("Authorization", format!("DeepL-Auth-Key {}", self.api_key))
            .form(&form)
            .send()
            .await
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            let body: DeepLResponse = response
                .json()
                .await
                .map_err(|e| TranslateError::Malformed(e.to_string()))?;
            return Ok(body.translations.into_iter().map(|t| t.text).collect());
        }

        let retry_after = retry_after_ms(response.headers());
        let body_text = response.text().await.unwrap_or_default();
        let err = classify_status(status, retry_after, &body_text);
        warn!(status = status.as_u16(), error = %err, "deepl request failed");
        Err(err)
    }
}

/// One `text` field per input; `source_lang` is omitted for English (DeepL default).
fn build_form<'a>(texts: &'a [String], from: &'a str, to: &'a str) -> Vec<(&'static str, &'a str)> {
    let mut form: Vec<(&'static str, &'a str)> = texts.iter().map(|t| ("text", t.as_str())).collect();
    if from != "EN" {
        form.push(("source_lang", from));
    }
    form.push(("target_lang", to));
    form
}

pub(crate) fn classify_transport(e: reqwest::Error) -> TranslateError {
    if e.is_timeout() {
        TranslateError::Timeout
    } else {
        TranslateError::Network(e.to_string())
    }
}

pub(crate) fn retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(|secs| secs.saturating_mul(1000))
}

/// Map a non-success HTTP status to the error taxonomy.
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after_ms: Option<u64>,
    body: &str,
) -> TranslateError {
    let message: String = body.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        TranslateError::RateLimited { retry_after_ms }
    } else if status.is_server_error() {
        TranslateError::Upstream {
            status: status.as_u16(),
            message,
        }
    } else {
        TranslateError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[derive(Deserialize)]
struct DeepLResponse {
    translations: Vec<DeepLTranslation>,
}

#[derive(Deserialize)]
struct DeepLTranslation {
    text: String,
}
