use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::events::{DLQ_TOPIC, DlqMessage};
use crate::idempotency::IdempotentEmitter;
use crate::metrics::Counters;
use crate::time::now_ms;

/// Writes exhausted-retry messages to `dead-letter-queue` (C4, §4.3).
///
/// Publishing goes through the plain transport, not the idempotent emitter's
/// ledger keying — DLQ entries are per-attempt diagnostics, not a logical
/// event in the `(correlationId, eventType)` sense. The emitter is reused
/// only for its transport handle.
pub struct DlqPublisher {
    emitter: Arc<IdempotentEmitter>,
    metrics: Arc<Counters>,
}

impl DlqPublisher {
    pub fn new(emitter: Arc<IdempotentEmitter>, metrics: Arc<Counters>) -> Self {
        Self { emitter, metrics }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn publish(
        &self,
        original_event: Value,
        original_topic: &str,
        original_partition: i32,
        original_offset: i64,
        failure_reason: String,
        attempts: u32,
        correlation_id: &str,
        event_id: Uuid,
    ) -> anyhow::Result<()> {
        let message = DlqMessage {
            original_event,
            original_topic: original_topic.to_string(),
            original_partition,
            original_offset,
            failure_reason,
            failure_timestamp: now_ms() as i64,
            attempts,
            correlation_id: correlation_id.to_string(),
            event_id,
        };

        let value = serde_json::to_value(&message)?;
        self.emitter
            .transport()
            .publish(DLQ_TOPIC, correlation_id, value)
            .await?;
        self.metrics.dlq_published.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        Ok(())
    }
}
