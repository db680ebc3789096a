//! Orchestrator operation counters
//!
//! - Counters only, monotonic
//! - Reset only on process start
//! - Relaxed atomics; exactness across counters is not required

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for every workflow the orchestrator runs.
#[derive(Debug, Default)]
pub struct OperationMetrics {
    promotions: AtomicU64,
    ejections: AtomicU64,
    detaches: AtomicU64,
    elections: AtomicU64,
    attach_failures: AtomicU64,
    unexpected_faults: AtomicU64,
    rejected_requests: AtomicU64,
    instances_provisioned: AtomicU64,
}

impl OperationMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a completed promote.
    pub fn increment_promotions(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a completed eject.
    pub fn increment_ejections(&self) {
        self.ejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_detaches(&self) {
        self.detaches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_elections(&self) {
        self.elections.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a recognised remote failure surfaced as an attach error.
    pub fn increment_attach_failures(&self) {
        self.attach_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Count an unrecognised remote fault propagated unchanged.
    pub fn increment_unexpected_faults(&self) {
        self.unexpected_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rejected_requests(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_instances_provisioned(&self, count: u64) {
        self.instances_provisioned.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            promotions: self.promotions.load(Ordering::Relaxed),
            ejections: self.ejections.load(Ordering::Relaxed),
            detaches: self.detaches.load(Ordering::Relaxed),
            elections: self.elections.load(Ordering::Relaxed),
            attach_failures: self.attach_failures.load(Ordering::Relaxed),
            unexpected_faults: self.unexpected_faults.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            instances_provisioned: self.instances_provisioned.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of all counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub promotions: u64,
    pub ejections: u64,
    pub detaches: u64,
    pub elections: u64,
    pub attach_failures: u64,
    pub unexpected_faults: u64,
    pub rejected_requests: u64,
    pub instances_provisioned: u64,
}
