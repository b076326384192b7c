//! Batch coalescer: one open batch per target language, sealed when it reaches
//! `max_batch` unique texts or when its window elapses, whichever comes first.
//!
//! Sealing detaches the batch from the table before the network call starts,
//! so later enqueues open a fresh batch instead of racing the in-flight one.
//! Every batch carries a generation number; a window timer only seals the
//! batch it was started for.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Fallback, GatewayClient, Language, PersistentCache, Resolution};
use crate::config::BatchConfig;
use crate::metrics::{metric_names, MetricsRegistry};
use crate::state_machine::{BatchPhase, PhaseBoard};

/// Callback run once with the outcome for one enqueued text.
pub type ResolveFn = Box<dyn FnOnce(Resolution) + Send + 'static>;

struct PendingBatch {
    generation: u64,
    opened_at: Instant,
    /// Unique texts in request order; index i of the response belongs to texts[i].
    texts: Vec<String>,
    waiters: HashMap<String, Vec<ResolveFn>>,
}

impl PendingBatch {
    /// Hand every waiter still attached the source text.
    fn fall_back(&mut self, reason: &str) {
        for (text, resolvers) in self.waiters.drain() {
            let fallback = Fallback {
                source: text,
                reason: reason.to_string(),
            };
            for resolve in resolvers {
                resolve(Err(fallback.clone()));
            }
        }
    }
}

impl Drop for PendingBatch {
    // A batch unwound mid-flight still settles its waiters.
    fn drop(&mut self) {
        if !self.waiters.is_empty() {
            self.fall_back("batch abandoned");
        }
    }
}

#[derive(Default)]
struct BatchTable {
    pending: HashMap<Language, PendingBatch>,
    in_flight: HashMap<Language, usize>,
    next_generation: u64,
}

#[derive(Debug, Clone, Copy)]
enum SealReason {
    Size,
    Window,
}

pub struct Coalescer {
    table: Mutex<BatchTable>,
    gateway: Arc<GatewayClient>,
    cache: Arc<PersistentCache>,
    phases: Arc<PhaseBoard>,
    metrics: Arc<MetricsRegistry>,
    source: Language,
    window: Duration,
    max_batch: usize,
    runtime: Handle,
}

impl Coalescer {
    pub fn new(
        gateway: Arc<GatewayClient>,
        cache: Arc<PersistentCache>,
        phases: Arc<PhaseBoard>,
        metrics: Arc<MetricsRegistry>,
        source: Language,
        config: &BatchConfig,
        runtime: Handle,
    ) -> Self {
        Self {
            table: Mutex::new(BatchTable::default()),
            gateway,
            cache,
            phases,
            metrics,
            source,
            window: Duration::from_millis(config.window_ms),
            max_batch: config.max_batch.max(1),
            runtime,
        }
    }

    /// Queue `text` for translation into `target`; `on_resolved` runs exactly once.
    pub fn enqueue(self: &Arc<Self>, text: String, target: Language, on_resolved: ResolveFn) {
        if target == self.source {
            on_resolved(Ok(text));
            return;
        }

        let (opened, sealed) = {
            let mut table = self.table.lock();
            let BatchTable {
                pending,
                next_generation,
                ..
            } = &mut *table;

            let mut opened = None;
            let batch = pending.entry(target).or_insert_with(|| {
                *next_generation += 1;
                opened = Some(*next_generation);
                PendingBatch {
                    generation: *next_generation,
                    opened_at: Instant::now(),
                    texts: Vec::new(),
                    waiters: HashMap::new(),
                }
            });

            match batch.waiters.get_mut(&text) {
                Some(waiters) => waiters.push(on_resolved),
                None => {
                    batch.texts.push(text.clone());
                    batch.waiters.insert(text, vec![on_resolved]);
                }
            }
            let full = batch.texts.len() >= self.max_batch;

            if opened.is_some() {
                self.move_phase(target, BatchPhase::Collecting);
                debug!(language = %target, "batch opened");
            }
            let sealed = if full {
                self.detach(&mut table, target, SealReason::Size)
            } else {
                None
            };
            (opened, sealed)
        };

        match (opened, sealed) {
            (_, Some(batch)) => self.dispatch(target, batch),
            (Some(generation), None) => self.start_window(target, generation),
            (None, None) => {}
        }
    }

    /// Current lifecycle phase for `target`.
    pub fn phase(&self, target: Language) -> BatchPhase {
        self.phases.current(target)
    }

    /// Texts waiting in the open batch for `target`.
    pub fn pending_len(&self, target: Language) -> usize {
        self.table
            .lock()
            .pending
            .get(&target)
            .map(|b| b.texts.len())
            .unwrap_or(0)
    }

    fn start_window(self: &Arc<Self>, target: Language, generation: u64) {
        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(this.window).await;
            let sealed = {
                let mut table = this.table.lock();
                let current = table.pending.get(&target).map(|b| b.generation) == Some(generation);
                if current {
                    this.detach(&mut table, target, SealReason::Window)
                } else {
                    None
                }
            };
            if let Some(batch) = sealed {
                this.dispatch(target, batch);
            }
        });
    }

    /// Remove the open batch for `target` and mark it in flight. Table lock held.
    fn detach(
        &self,
        table: &mut BatchTable,
        target: Language,
        reason: SealReason,
    ) -> Option<PendingBatch> {
        let batch = table.pending.remove(&target)?;
        *table.in_flight.entry(target).or_insert(0) += 1;
        self.move_phase(target, BatchPhase::Sending);

        let waited_us = batch.opened_at.elapsed().as_micros() as f64;
        self.metrics.record(metric_names::BATCH_WAIT, waited_us);
        self.metrics
            .record(metric_names::BATCH_TEXTS, batch.texts.len() as f64);
        info!(
            language = %target,
            generation = batch.generation,
            texts = batch.texts.len(),
            reason = ?reason,
            "batch_sealed"
        );
        Some(batch)
    }

    fn dispatch(self: &Arc<Self>, target: Language, batch: PendingBatch) {
        let this = Arc::clone(self);
        self.runtime.spawn(async move {
            this.send_batch(target, batch).await;
        });
    }

    async fn send_batch(&self, target: Language, mut batch: PendingBatch) {
        let generation = batch.generation;
        let timer = self.metrics.timer(metric_names::BATCH_ROUNDTRIP);
        let result = self
            .gateway
            .translate_batch(&batch.texts, self.source, target)
            .await;
        drop(timer);

        match result {
            Ok(translations) => {
                self.cache.put(&batch.texts, &translations, target);
                self.finish(target);
                debug!(language = %target, generation, "batch resolved");
                let mut waiters = std::mem::take(&mut batch.waiters);
                for (text, translation) in batch.texts.iter().zip(translations) {
                    for resolve in waiters.remove(text).unwrap_or_default() {
                        resolve(Ok(translation.clone()));
                    }
                }
                batch.waiters = waiters;
            }
            Err(e) => {
                self.finish(target);
                warn!(
                    language = %target,
                    generation,
                    texts = batch.texts.len(),
                    error = %e,
                    "batch failed, falling back to source text"
                );
                batch.fall_back(&e.to_string());
            }
        }
    }

    /// Bookkeeping after a batch completes: Sending → Idle unless more work exists.
    fn finish(&self, target: Language) {
        let mut table = self.table.lock();
        let remaining = match table.in_flight.get_mut(&target) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            table.in_flight.remove(&target);
        }

        let next = if table.pending.contains_key(&target) {
            BatchPhase::Collecting
        } else if remaining > 0 {
            BatchPhase::Sending
        } else {
            BatchPhase::Idle
        };
        self.move_phase(target, next);
    }

    /// Phase changes here are driven by the table, so a rejected one is a bookkeeping bug.
    fn move_phase(&self, target: Language, next: BatchPhase) {
        let moved = self.phases.transition(target, next);
        debug_assert!(moved.is_ok(), "{moved:?}");
    }
}
