use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::domain::ProcessedEvent;

/// Outcome of attempting to record a processed-events row (§4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MarkOutcome {
    /// This caller's insert won the unique constraint race.
    Recorded,
    /// Someone else already recorded this `(correlation_id, event_type)` or
    /// `event_id`; the event is already handled.
    AlreadyPresent,
}

/// Persistent record of `(eventId, correlationId, eventType)` triples (C2).
///
/// The composite unique on `(correlation_id, event_type)` is the mechanism
/// by which two concurrent handlers racing on the same logical step are
/// serialised: the loser's insert conflicts and is treated as success (§5).
#[async_trait]
pub trait IdempotencyStore: Send + Sync + 'static {
    /// Cheap indexed lookup; if present, returns the stored event id.
    async fn lookup(&self, correlation_id: &str, event_type: &str) -> anyhow::Result<Option<Uuid>>;

    /// Attempts to insert a new ledger row. A unique violation on either
    /// `event_id` or `(correlation_id, event_type)` is reported as
    /// `AlreadyPresent`, not an error.
    async fn mark(
        &self,
        event_id: Uuid,
        correlation_id: &str,
        event_type: &str,
        payload: &Value,
        source: &str,
        version: &str,
    ) -> anyhow::Result<MarkOutcome>;

    async fn get(&self, event_id: Uuid) -> anyhow::Result<Option<ProcessedEvent>>;
}
