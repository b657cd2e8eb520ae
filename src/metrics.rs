//! Observability: histogram metrics for the listening session.
//! Timings are in microseconds; event counts are recorded as samples of 1.0
//! so they show up in `count`.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

/// Fixed-capacity ring buffer for histogram samples.
struct SampleRing {
    samples: Vec<f64>,
    pos: usize,
    count: usize,
    total: u64,
    capacity: usize,
}

impl SampleRing {
    fn new(capacity: usize) -> Self {
        Self {
            samples: vec![0.0; capacity],
            pos: 0,
            count: 0,
            total: 0,
            capacity,
        }
    }

    fn push(&mut self, value: f64) {
        self.samples[self.pos] = value;
        self.pos = (self.pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
        self.total += 1;
    }

    fn percentile(&self, p: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        let mut sorted: Vec<f64> = self.samples[..self.count].to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let idx = ((p / 100.0) * (self.count as f64 - 1.0)).round() as usize;
        let idx = idx.min(self.count - 1);
        sorted[idx]
    }
}

/// Stores histograms for all named metrics.
pub struct MetricsRegistry {
    histograms: Mutex<HashMap<&'static str, SampleRing>>,
    ring_capacity: usize,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    pub fn with_capacity(ring_capacity: usize) -> Self {
        Self {
            histograms: Mutex::new(HashMap::new()),
            ring_capacity: ring_capacity.max(1),
        }
    }

    /// Record a sample for the named metric.
    pub fn record(&self, name: &'static str, value: f64) {
        let mut hists = self.histograms.lock();
        hists
            .entry(name)
            .or_insert_with(|| SampleRing::new(self.ring_capacity))
            .push(value);
        tracing::trace!(metric = name, value = value, "metric_recorded");
    }

    /// Record elapsed microseconds since `start`.
    pub fn record_since(&self, name: &'static str, start: Instant) {
        self.record(name, start.elapsed().as_micros() as f64);
    }

    /// Record one occurrence of a counted event.
    pub fn incr(&self, name: &'static str) {
        self.record(name, 1.0);
    }

    /// Total samples ever recorded for `name` (not capped by the ring).
    pub fn count(&self, name: &str) -> u64 {
        self.histograms.lock().get(name).map_or(0, |ring| ring.total)
    }

    /// Percentile for a metric (p value 0-100).
    pub fn percentile(&self, name: &str, p: f64) -> f64 {
        let hists = self.histograms.lock();
        hists
            .get(name)
            .map(|ring| ring.percentile(p))
            .unwrap_or(0.0)
    }

    /// Summary of all metrics at p50/p95/p99.
    pub fn summary(&self) -> HashMap<String, MetricSummary> {
        let hists = self.histograms.lock();
        let mut out = HashMap::new();
        for (&name, ring) in hists.iter() {
            out.insert(
                name.to_string(),
                MetricSummary {
                    p50: ring.percentile(50.0),
                    p95: ring.percentile(95.0),
                    p99: ring.percentile(99.0),
                    count: ring.total,
                },
            );
        }
        out
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricSummary {
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub count: u64,
}

/// Well-known metric names (constants to avoid typos).
pub mod metric_names {
    pub const EXTRACT: &str = "t_extract";
    pub const SESSION_START: &str = "t_session_start";
    pub const COMMAND_HANDLER: &str = "t_command_handler";
    pub const RESTART_BACKOFF: &str = "t_restart_backoff";
    pub const STREAM_STARTED: &str = "stream_started";
    pub const COMMAND_DISPATCHED: &str = "command_dispatched";
    pub const DUPLICATE_SUPPRESSED: &str = "duplicate_suppressed";
    pub const STALE_EVENT_DROPPED: &str = "stale_event_dropped";
}
