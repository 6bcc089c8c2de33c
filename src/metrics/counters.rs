use std::sync::atomic::AtomicU64;
use std::sync::Arc;

/// Minimal counters for operational visibility across the pipeline.
#[derive(Clone, Default)]
pub struct Counters {
    pub purchases_created: Arc<AtomicU64>,
    pub purchases_rejected: Arc<AtomicU64>,

    pub allocations_assigned: Arc<AtomicU64>,
    pub allocations_waitlisted: Arc<AtomicU64>,

    pub sessions_generated: Arc<AtomicU64>,
    pub topup_sweeps: Arc<AtomicU64>,
    pub topup_allocations_skipped: Arc<AtomicU64>,

    pub cache_invalidations: Arc<AtomicU64>,
    pub cache_invalidation_failures: Arc<AtomicU64>,

    pub dlq_published: Arc<AtomicU64>,

    pub refresh_conflicts: Arc<AtomicU64>,
    pub refresh_stale: Arc<AtomicU64>,
    pub refresh_rotations: Arc<AtomicU64>,
}
