//! A single fire-and-forget counter sink. No histograms, no exporters — just
//! enough to answer "how many times has X gone wrong" from the admin surface.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Implemented by anything that wants to observe error counts. Never
/// blocks and never returns a value — callers fire and move on.
pub trait MetricsSink: Send + Sync {
    fn record_error(&self, kind: &'static str);
}

/// Production sink: an `AtomicU64` counter per distinct `kind`, created on
/// first use.
#[derive(Default)]
pub struct CountingMetrics {
    counters: Mutex<HashMap<&'static str, AtomicU64>>,
}

impl CountingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all counters observed so far, for the admin surface.
    pub fn snapshot(&self) -> HashMap<String, u64> {
        self.counters
            .lock()
            .iter()
            .map(|(k, v)| (k.to_string(), v.load(Ordering::Relaxed)))
            .collect()
    }
}

impl MetricsSink for CountingMetrics {
    fn record_error(&self, kind: &'static str) {
        let counters = self.counters.lock();
        if let Some(counter) = counters.get(kind) {
            counter.fetch_add(1, Ordering::Relaxed);
            return;
        }
        drop(counters);
        self.counters
            .lock()
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// Used by tests that don't care about metrics.
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_error(&self, _kind: &'static str) {}
}
