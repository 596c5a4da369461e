//! Process-wide build counters.
//!
//! Counters are incremented silently at the call site. Call
//! [`Metrics::flush`] to emit current values as a single
//! `tracing::info!` event (the coordinator does so after every pipeline run).

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Build and trigger counters, read with relaxed ordering.
pub struct Metrics {
    triggers_received: AtomicU64,
    triggers_dropped: AtomicU64,
    builds_succeeded: AtomicU64,
    builds_failed: AtomicU64,
    artifacts_pruned: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            triggers_received: AtomicU64::new(0),
            triggers_dropped: AtomicU64::new(0),
            builds_succeeded: AtomicU64::new(0),
            builds_failed: AtomicU64::new(0),
            artifacts_pruned: AtomicU64::new(0),
        }
    }

    pub fn inc_triggers_received(&self) {
        self.triggers_received.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "triggers_received", "counter incremented");
    }

    /// A trigger arrived while a build was running or after shutdown.
    pub fn inc_triggers_dropped(&self) {
        self.triggers_dropped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "triggers_dropped", "counter incremented");
    }

    pub fn inc_builds_succeeded(&self) {
        self.builds_succeeded.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_succeeded", "counter incremented");
    }

    pub fn inc_builds_failed(&self) {
        self.builds_failed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "builds_failed", "counter incremented");
    }

    pub fn add_artifacts_pruned(&self, n: u64) {
        self.artifacts_pruned.fetch_add(n, Ordering::Relaxed);
    }

    /// Emit all current counter values as a single `info!` event.
    pub fn flush(&self) {
        tracing::info!(
            metric = "flush",
            triggers_received = self.triggers_received(),
            triggers_dropped = self.triggers_dropped(),
            builds_succeeded = self.builds_succeeded(),
            builds_failed = self.builds_failed(),
            artifacts_pruned = self.artifacts_pruned(),
        );
    }

    pub fn triggers_received(&self) -> u64 {
        self.triggers_received.load(Ordering::Relaxed)
    }

    pub fn triggers_dropped(&self) -> u64 {
        self.triggers_dropped.load(Ordering::Relaxed)
    }

    pub fn builds_succeeded(&self) -> u64 {
        self.builds_succeeded.load(Ordering::Relaxed)
    }

    pub fn builds_failed(&self) -> u64 {
        self.builds_failed.load(Ordering::Relaxed)
    }

    pub fn artifacts_pruned(&self) -> u64 {
        self.artifacts_pruned.load(Ordering::Relaxed)
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        self.triggers_received.store(0, Ordering::Relaxed);
        self.triggers_dropped.store(0, Ordering::Relaxed);
        self.builds_succeeded.store(0, Ordering::Relaxed);
        self.builds_failed.store(0, Ordering::Relaxed);
        self.artifacts_pruned.store(0, Ordering::Relaxed);
    }
}
