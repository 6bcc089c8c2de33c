use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::events::{EventMetadata, EventType};
use crate::transport::EventLogTransport;

use super::store::{IdempotencyStore, MarkOutcome};

/// Persists to the idempotency ledger before publishing (C3, §4.2).
///
/// `emit` never publishes twice for the same `(correlation_id, event_type)`:
/// a second caller observes the existing ledger row and returns its id
/// without touching the transport.
pub struct IdempotentEmitter {
    store: Arc<dyn IdempotencyStore>,
    transport: Arc<dyn EventLogTransport>,
    source: String,
}

impl IdempotentEmitter {
    pub fn new(
        store: Arc<dyn IdempotencyStore>,
        transport: Arc<dyn EventLogTransport>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            store,
            transport,
            source: source.into(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn EventLogTransport> {
        &self.transport
    }

    /// Emits `body` keyed on `correlation_id`. Returns the event id that was
    /// actually recorded in the ledger — either a freshly minted one, or the
    /// id a previous call already stored.
    pub async fn emit(
        &self,
        event_type: EventType,
        correlation_id: &str,
        body: &Value,
    ) -> anyhow::Result<Uuid> {
        if let Some(existing) = self
            .store
            .lookup(correlation_id, event_type.as_str())
            .await?
        {
            return Ok(existing);
        }

        let event_id = Uuid::new_v4();
        let outcome = self
            .store
            .mark(
                event_id,
                correlation_id,
                event_type.as_str(),
                body,
                &self.source,
                "1.0.0",
            )
            .await?;

        let committed_id = match outcome {
            MarkOutcome::Recorded => event_id,
            MarkOutcome::AlreadyPresent => self
                .store
                .lookup(correlation_id, event_type.as_str())
                .await?
                .unwrap_or(event_id),
        };

        if outcome == MarkOutcome::AlreadyPresent {
            return Ok(committed_id);
        }

        let metadata = EventMetadata::new(committed_id, correlation_id, &self.source);
        let mut envelope = body.clone();
        if let Value::Object(ref mut map) = envelope {
            map.insert("_metadata".to_string(), serde_json::to_value(&metadata)?);
            map.insert("type".to_string(), Value::String(event_type.as_str().to_string()));
        }

        self.transport
            .publish(event_type.topic(), correlation_id, envelope)
            .await?;

        Ok(committed_id)
    }
}
