use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Idempotency ledger row (spec.md §3 ProcessedEvent).
///
/// Invariant E1: unique on `event_id` and unique on
/// `(correlation_id, event_type)`; a conflict on either is how a duplicate
/// delivery or a duplicate logical event is detected (§4.2).
#[derive(Clone, Debug)]
pub struct ProcessedEvent {
    pub event_id: Uuid,
    pub correlation_id: String,
    pub event_type: String,
    pub payload: Value,
    pub source: String,
    pub processed_at: DateTime<Utc>,
}
