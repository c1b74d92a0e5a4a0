//! Pipeline metrics
//!
//! Lock-free per-port counters and a fixed-bucket latency histogram, updated
//! by the observability middleware and read through [`PipelineMetrics::snapshot`].

use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Upper bounds (milliseconds) of the latency histogram buckets. A final
/// overflow bucket counts everything above the last bound.
pub const LATENCY_BUCKETS_MS: [u64; 11] = [1, 5, 10, 25, 50, 100, 250, 500, 1000, 2500, 5000];

/// How an invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Default)]
struct PortMetrics {
    started: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    total_latency_us: AtomicU64,
    max_latency_us: AtomicU64,
    buckets: [AtomicU64; LATENCY_BUCKETS_MS.len() + 1],
}

impl PortMetrics {
    fn observe(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_latency_us.fetch_add(micros, Ordering::Relaxed);
        self.max_latency_us.fetch_max(micros, Ordering::Relaxed);

        let millis = elapsed.as_millis();
        let bucket = LATENCY_BUCKETS_MS
            .iter()
            .position(|bound| millis <= u128::from(*bound))
            .unwrap_or(LATENCY_BUCKETS_MS.len());
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> PortMetricsSnapshot {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let failed = self.failed.load(Ordering::Relaxed);
        let timed_out = self.timed_out.load(Ordering::Relaxed);
        let completed = succeeded + failed + timed_out;
        let total_latency_us = self.total_latency_us.load(Ordering::Relaxed);

        PortMetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            succeeded,
            failed,
            timed_out,
            avg_latency_us: if completed > 0 {
                total_latency_us / completed
            } else {
                0
            },
            max_latency_us: self.max_latency_us.load(Ordering::Relaxed),
            latency_histogram: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

/// Point-in-time metrics for one port
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortMetricsSnapshot {
    pub started: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub avg_latency_us: u64,
    pub max_latency_us: u64,
    /// Counts per bucket of [`LATENCY_BUCKETS_MS`], plus the overflow bucket
    pub latency_histogram: Vec<u64>,
}

impl PortMetricsSnapshot {
    pub fn completed(&self) -> u64 {
        self.succeeded + self.failed + self.timed_out
    }

    /// Invocations started but not yet recorded as finished
    pub fn in_progress(&self) -> u64 {
        self.started.saturating_sub(self.completed())
    }
}

/// Per-port pipeline metrics
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    ports: DashMap<String, Arc<PortMetrics>>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn port(&self, port: &str) -> Arc<PortMetrics> {
        if let Some(existing) = self.ports.get(port) {
            return Arc::clone(existing.value());
        }
        Arc::clone(self.ports.entry(port.to_string()).or_default().value())
    }

    pub fn record_start(&self, port: &str) {
        self.port(port).started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome(&self, port: &str, outcome: Outcome, elapsed: Duration) {
        let metrics = self.port(port);
        let counter = match outcome {
            Outcome::Success => &metrics.succeeded,
            Outcome::Failure => &metrics.failed,
            Outcome::Timeout => &metrics.timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics.observe(elapsed);
    }

    pub fn snapshot(&self, port: &str) -> Option<PortMetricsSnapshot> {
        self.ports.get(port).map(|metrics| metrics.snapshot())
    }

    /// Snapshots of every port, keyed by name
    pub fn snapshot_all(&self) -> BTreeMap<String, PortMetricsSnapshot> {
        self.ports
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    pub fn reset(&self) {
        self.ports.clear();
    }
}
