// metrics.rs - Process-wide aggregation counters
//
// Incremented from the collection phase (collect.rs), the level scans
// (propagate.rs) and engine construction (engine.rs). Use
// get_aggregation_metrics() for a snapshot and reset_aggregation_metrics()
// between tests.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::debug_println;

static HITS_COLLECTED: AtomicU64 = AtomicU64::new(0);
static LEVELS_PROPAGATED: AtomicU64 = AtomicU64::new(0);
static ANCESTORS_SCANNED: AtomicU64 = AtomicU64::new(0);
static HITS_FORWARDED: AtomicU64 = AtomicU64::new(0);
static DEGRADED_AGGREGATIONS: AtomicU64 = AtomicU64::new(0);

/// Aggregation metrics snapshot
#[derive(Debug, Clone, Default)]
pub struct AggregationMetrics {
    /// (document, bucket) pairs presented to the collection phase
    pub hits_collected: u64,
    /// Level transitions completed
    pub levels_propagated: u64,
    /// Ancestor documents visited by level scans
    pub ancestors_scanned: u64,
    /// Calls made to downstream forward sinks
    pub hits_forwarded: u64,
    /// Aggregations that degraded to an empty result on a missing relation
    pub degraded_aggregations: u64,
}

impl AggregationMetrics {
    pub fn summary(&self) -> String {
        format!(
            "Hits: {} collected, {} forwarded; {} levels propagated over {} ancestor docs; {} degraded",
            self.hits_collected,
            self.hits_forwarded,
            self.levels_propagated,
            self.ancestors_scanned,
            self.degraded_aggregations
        )
    }
}

pub fn record_hits_collected(count: u64) {
    HITS_COLLECTED.fetch_add(count, Ordering::Relaxed);
}

pub fn record_level_propagated(ancestors_scanned: u64) {
    LEVELS_PROPAGATED.fetch_add(1, Ordering::Relaxed);
    ANCESTORS_SCANNED.fetch_add(ancestors_scanned, Ordering::Relaxed);
}

pub fn record_hits_forwarded(count: u64) {
    HITS_FORWARDED.fetch_add(count, Ordering::Relaxed);
}

pub fn record_degraded_aggregation() {
    let total = DEGRADED_AGGREGATIONS.fetch_add(1, Ordering::Relaxed) + 1;
    debug_println!("📊 METRIC: Aggregation degraded to empty result (total degraded: {})", total);
}

pub fn get_aggregation_metrics() -> AggregationMetrics {
    AggregationMetrics {
        hits_collected: HITS_COLLECTED.load(Ordering::Relaxed),
        levels_propagated: LEVELS_PROPAGATED.load(Ordering::Relaxed),
        ancestors_scanned: ANCESTORS_SCANNED.load(Ordering::Relaxed),
        hits_forwarded: HITS_FORWARDED.load(Ordering::Relaxed),
        degraded_aggregations: DEGRADED_AGGREGATIONS.load(Ordering::Relaxed),
    }
}

pub fn reset_aggregation_metrics() {
    HITS_COLLECTED.store(0, Ordering::Relaxed);
    LEVELS_PROPAGATED.store(0, Ordering::Relaxed);
    ANCESTORS_SCANNED.store(0, Ordering::Relaxed);
    HITS_FORWARDED.store(0, Ordering::Relaxed);
    DEGRADED_AGGREGATIONS.store(0, Ordering::Relaxed);
}
