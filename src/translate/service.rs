//! Wiring of the whole pipeline, built once per process and shared by reference.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tracing::info;

use super::cache::TranslationCache;
use super::deepl::DeepLProvider;
use super::relay::RelayProvider;
use super::store::{SqliteStore, StoreError};
use super::{
    Coalescer, GatewayClient, PageTranslator, PersistentCache, TranslateError,
    TranslationAccessor, TranslationProvider,
};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::metrics::MetricsRegistry;
use crate::state_machine::PhaseBoard;

#[derive(Debug)]
pub enum ServiceError {
    Store(StoreError),
    Provider(TranslateError),
    /// Built outside a tokio runtime.
    NoRuntime,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::Store(e) => write!(f, "{e}"),
            ServiceError::Provider(e) => write!(f, "provider setup failed: {e}"),
            ServiceError::NoRuntime => write!(f, "translation service requires a tokio runtime"),
        }
    }
}

impl std::error::Error for ServiceError {}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Store(e)
    }
}

impl From<TranslateError> for ServiceError {
    fn from(e: TranslateError) -> Self {
        ServiceError::Provider(e)
    }
}

/// Pick the upstream from config: a relay when `relay_url` is set, DeepL otherwise.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn TranslationProvider>, TranslateError> {
    match &config.provider.relay_url {
        Some(url) => {
            let timeout = Duration::from_secs(config.gateway.request_timeout_secs);
            Ok(Arc::new(RelayProvider::new(url, timeout)?))
        }
        None => Ok(Arc::new(DeepLProvider::new(&config.provider)?)),
    }
}

pub struct TranslationService {
    pub accessor: Arc<TranslationAccessor>,
    pub coalescer: Arc<Coalescer>,
    pub gateway: Arc<GatewayClient>,
    pub persistent: Arc<PersistentCache>,
    pub pages: Arc<PageTranslator>,
    pub phases: Arc<PhaseBoard>,
    pub metrics: Arc<MetricsRegistry>,
}

impl TranslationService {
    /// Open the on-disk store from config and wire everything on the current runtime.
    pub fn open(
        config: &Config,
        provider: Arc<dyn TranslationProvider>,
    ) -> Result<Self, ServiceError> {
        let runtime = Handle::try_current().map_err(|_| ServiceError::NoRuntime)?;
        let store = Arc::new(SqliteStore::open(&config.cache.db_path)?);
        Ok(Self::build(
            config,
            provider,
            store,
            Arc::new(SystemClock),
            runtime,
        ))
    }

    pub fn build(
        config: &Config,
        provider: Arc<dyn TranslationProvider>,
        store: Arc<SqliteStore>,
        clock: Arc<dyn Clock>,
        runtime: Handle,
    ) -> Self {
        let source = config.source_language;
        let ttl = Duration::from_secs(config.cache.ttl_secs);
        let metrics = Arc::new(MetricsRegistry::new());
        let phases = Arc::new(PhaseBoard::new());

        let gateway = Arc::new(GatewayClient::new(
            provider,
            config.gateway.clone(),
            Arc::clone(&metrics),
        ));
        let persistent = Arc::new(PersistentCache::open(
            store.clone(),
            Arc::clone(&clock),
            source,
            ttl,
            config.cache.max_entries,
        ));
        let coalescer = Arc::new(Coalescer::new(
            Arc::clone(&gateway),
            Arc::clone(&persistent),
            Arc::clone(&phases),
            Arc::clone(&metrics),
            source,
            &config.batch,
            runtime,
        ));
        let resolved = TranslationCache::new(
            source,
            config.cache.memory_capacity,
            ttl,
            Arc::clone(&clock),
        );
        let accessor = Arc::new(TranslationAccessor::new(
            source,
            resolved,
            Arc::clone(&persistent),
            Arc::clone(&coalescer),
            store.clone(),
        ));
        let pages = Arc::new(PageTranslator::new(
            store,
            Arc::clone(&gateway),
            clock,
            source,
            ttl,
        ));

        info!(
            provider = gateway.provider_name(),
            source = %source,
            window_ms = config.batch.window_ms,
            max_batch = config.batch.max_batch,
            "translation service ready"
        );

        Self {
            accessor,
            coalescer,
            gateway,
            persistent,
            pages,
            phases,
            metrics,
        }
    }
}
