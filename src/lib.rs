//! batch-translate: UI string translation with request coalescing.
//!
//! Callers ask a [`translate::TranslationAccessor`] for strings synchronously.
//! Misses are batched per target language by the [`translate::Coalescer`],
//! sent through the [`translate::GatewayClient`] and remembered in a
//! persistent cache. [`server`] exposes the gateway over HTTP.

pub mod clock;
pub mod config;
pub mod metrics;
pub mod rate_limit;
pub mod server;
pub mod state_machine;
pub mod translate;

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over the configured filter.
/// Calling it twice is harmless; the first subscriber stays.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
