//! Translation pipeline: accessor → resolved set → persistent cache →
//! coalescer → gateway → provider.

pub mod accessor;
pub mod cache;
pub mod coalescer;
pub mod deepl;
pub mod gateway;
pub mod language;
pub mod page;
pub mod persistent;
pub mod relay;
pub mod service;
pub mod store;

use std::time::Duration;

use async_trait::async_trait;

pub use accessor::TranslationAccessor;
pub use coalescer::Coalescer;
pub use gateway::GatewayClient;
pub use language::Language;
pub use page::PageTranslator;
pub use persistent::PersistentCache;
pub use service::TranslationService;

/// Outcome handed to every requester of a batched text.
pub type Resolution = Result<String, Fallback>;

/// Degraded result: the source text is shown instead of a translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    pub source: String,
    pub reason: String,
}

impl Fallback {
    /// Text to display in place of the missing translation.
    pub fn into_text(self) -> String {
        self.source
    }
}

/// External machine-translation backend.
///
/// `translate` receives codes already mapped through `language_code` and must
/// return one string per input, in input order.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Provider vocabulary for an internal language, `None` if unsupported.
    fn language_code(&self, lang: Language) -> Option<&'static str>;

    async fn translate(
        &self,
        texts: &[String],
        from: &str,
        to: &str,
    ) -> Result<Vec<String>, TranslateError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslateError {
    /// Language outside the supported set or unknown to the provider.
    UnsupportedLanguage(String),
    InvalidInput(String),
    RateLimited { retry_after_ms: Option<u64> },
    Upstream { status: u16, message: String },
    /// Non-retryable rejection (auth, quota, bad request).
    Rejected { status: u16, message: String },
    Network(String),
    Timeout,
    Malformed(String),
    RetriesExhausted { attempts: u32, last: Box<TranslateError> },
}

impl TranslateError {
    /// Whether the gateway may retry after this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranslateError::RateLimited { .. }
                | TranslateError::Upstream { .. }
                | TranslateError::Network(_)
                | TranslateError::Timeout
                | TranslateError::Malformed(_)
        )
    }

    /// Delay requested by the provider, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            TranslateError::RateLimited {
                retry_after_ms: Some(ms),
            } => Some(Duration::from_millis(*ms)),
            _ => None,
        }
    }
}

impl std::fmt::Display for TranslateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranslateError::UnsupportedLanguage(code) => {
                write!(f, "unsupported language code: {code}")
            }
            TranslateError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            TranslateError::RateLimited { retry_after_ms } => match retry_after_ms {
                Some(ms) => write!(f, "rate limited, retry after {ms}ms"),
                None => write!(f, "rate limited"),
            },
            TranslateError::Upstream { status, message } => {
                write!(f, "upstream error {status}: {message}")
            }
            TranslateError::Rejected { status, message } => {
                write!(f, "request rejected {status}: {message}")
            }
            TranslateError::Network(msg) => write!(f, "network error: {msg}"),
            TranslateError::Timeout => write!(f, "translation timeout"),
            TranslateError::Malformed(msg) => write!(f, "malformed response: {msg}"),
            TranslateError::RetriesExhausted { attempts, last } => {
                write!(f, "gave up after {attempts} attempts: {last}")
            }
        }
    }
}

impl std::error::Error for TranslateError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_transient_errors() {
        assert!(TranslateError::Timeout.is_transient());
        assert!(TranslateError::Malformed("no array".into()).is_transient());
        assert!(TranslateError::Upstream {
            status: 503,
            message: String::new()
        }
        .is_transient());
        assert!(!TranslateError::Rejected {
            status: 403,
            message: String::new()
        }
        .is_transient());
        assert!(!TranslateError::RetriesExhausted {
            attempts: 4,
            last: Box::new(TranslateError::Timeout)
        }
        .is_transient());
    }

    #[test]
    fn retry_after_only_from_rate_limit() {
        let limited = TranslateError::RateLimited {
            retry_after_ms: Some(1500),
        };
        assert_eq!(limited.retry_after(), Some(Duration::from_millis(1500)));
        assert_eq!(TranslateError::Timeout.retry_after(), None);
    }
}
