//! Observability: per-request ids, bounded histograms and drop-recorded timers.
//! `t_*` metrics are microseconds, the rest are plain counts.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;

const DEFAULT_WINDOW: usize = 1024;

/// Identifiers attached to an inbound translation request.
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub trace_id: String,
    pub request_id: String,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}

/// Records the time since creation under `name` when dropped.
pub struct Timer {
    name: &'static str,
    start: Instant,
    registry: Arc<MetricsRegistry>,
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.registry
            .record(self.name, self.start.elapsed().as_micros() as f64);
    }
}

/// Most recent `window` samples of one metric.
struct Histogram {
    samples: VecDeque<f64>,
    window: usize,
    total: u64,
}

impl Histogram {
    fn new(window: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(window),
            window,
            total: 0,
        }
    }

    fn push(&mut self, value: f64) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.total += 1;
    }

    fn summarize(&self) -> MetricSummary {
        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);
        let rank = |p: f64| -> f64 {
            match sorted.len() {
                0 => 0.0,
                n => sorted[((p * (n - 1) as f64).round() as usize).min(n - 1)],
            }
        };
        MetricSummary {
            p50: rank(0.50),
            p95: rank(0.95),
            p99: rank(0.99),
            max: sorted.last().copied().unwrap_or(0.0),
            count: self.total,
        }
    }
}

/// Summary served at `GET /metrics`. Percentiles cover the recent window,
/// `count` every sample since start.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub max: f64,
    pub count: u64,
}

pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, Histogram>>,
    window: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }

    pub fn with_window(window: usize) -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            window: window.max(1),
        }
    }

    pub fn record(&self, name: &'static str, value: f64) {
        self.histograms
            .lock()
            .entry(name)
            .or_insert_with(|| Histogram::new(self.window))
            .push(value);
        tracing::trace!(metric = name, value, "metric_recorded");
    }

    /// Time until the returned guard drops, whichever way the caller exits.
    pub fn timer(self: &Arc<Self>, name: &'static str) -> Timer {
        Timer {
            name,
            start: Instant::now(),
            registry: Arc::clone(self),
        }
    }

    pub fn snapshot(&self, name: &str) -> Option<MetricSummary> {
        self.histograms.lock().get(name).map(Histogram::summarize)
    }

    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        self.histograms
            .lock()
            .iter()
            .map(|(name, hist)| (name.to_string(), hist.summarize()))
            .collect()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub mod metric_names {
    pub const PROVIDER_CALL: &str = "t_provider_call";
    pub const GATEWAY_BATCH: &str = "t_gateway_batch";
    pub const BATCH_WAIT: &str = "t_batch_wait";
    pub const BATCH_ROUNDTRIP: &str = "t_batch_roundtrip";
    pub const SERVER_REQUEST: &str = "t_server_request";
    pub const BATCH_TEXTS: &str = "batch_texts";
    pub const PROVIDER_RETRIES: &str = "provider_retries";
}
