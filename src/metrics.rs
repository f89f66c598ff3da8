//! Daemon counters.
//!
//! Lightweight atomic counters exposed as a snapshot; callers poll
//! [`MetricsCollector::snapshot`], there is no exporter wiring.

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time view of the daemon counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// `get_paths` invocations.
    pub path_lookups: u64,
    /// Lookups that hit the deadline without fulfilment.
    pub lookup_timeouts: u64,
    /// Path requests sent to the path server.
    pub requests_sent: u64,
    /// Path replies deposited into the caches.
    pub replies_handled: u64,
    /// Revocations accepted after verification.
    pub revocations_handled: u64,
    /// Segments deleted by revocations.
    pub segments_revoked: u64,
    /// Datagrams accepted on the local API.
    pub api_requests: u64,
}

/// Metrics collector.
#[derive(Debug, Default)]
pub struct MetricsCollector {
    path_lookups: AtomicU64,
    lookup_timeouts: AtomicU64,
    requests_sent: AtomicU64,
    replies_handled: AtomicU64,
    revocations_handled: AtomicU64,
    segments_revoked: AtomicU64,
    api_requests: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_path_lookup(&self) {
        self.path_lookups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_timeout(&self) {
        self.lookup_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request_sent(&self) {
        self.requests_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reply_handled(&self) {
        self.replies_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_revocation_handled(&self) {
        self.revocations_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_segments_revoked(&self, count: u64) {
        self.segments_revoked.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_api_request(&self) {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a counter snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            path_lookups: self.path_lookups.load(Ordering::Relaxed),
            lookup_timeouts: self.lookup_timeouts.load(Ordering::Relaxed),
            requests_sent: self.requests_sent.load(Ordering::Relaxed),
            replies_handled: self.replies_handled.load(Ordering::Relaxed),
            revocations_handled: self.revocations_handled.load(Ordering::Relaxed),
            segments_revoked: self.segments_revoked.load(Ordering::Relaxed),
            api_requests: self.api_requests.load(Ordering::Relaxed),
        }
    }
}
