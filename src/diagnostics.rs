//! Lightweight atomic counters exposed to operators and tests, independent
//! of the `log` crate's line-oriented output.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Per-process counters, cheap to read from any thread. Cloning shares the
/// same underlying counters.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    inner: Arc<Counters>,
}

#[derive(Debug, Default)]
struct Counters {
    scans_received: AtomicU64,
    scans_dropped: AtomicU64,
    candidates_emitted: AtomicU64,
    touches_added: AtomicU64,
    touches_removed: AtomicU64,
    tuio_send_failures: AtomicU64,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn record_scan_received(&self) {
        self.inner.scans_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_dropped(&self) {
        self.inner.scans_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_candidates_emitted(&self, n: u64) {
        self.inner.candidates_emitted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_touch_added(&self) {
        self.inner.touches_added.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_touch_removed(&self) {
        self.inner.touches_removed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tuio_send_failure(&self) {
        self.inner.tuio_send_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            scans_received: self.inner.scans_received.load(Ordering::Relaxed),
            scans_dropped: self.inner.scans_dropped.load(Ordering::Relaxed),
            candidates_emitted: self.inner.candidates_emitted.load(Ordering::Relaxed),
            touches_added: self.inner.touches_added.load(Ordering::Relaxed),
            touches_removed: self.inner.touches_removed.load(Ordering::Relaxed),
            tuio_send_failures: self.inner.tuio_send_failures.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of the counters, safe to log or serialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DiagnosticsSnapshot {
    pub scans_received: u64,
    pub scans_dropped: u64,
    pub candidates_emitted: u64,
    pub touches_added: u64,
    pub touches_removed: u64,
    pub tuio_send_failures: u64,
}
