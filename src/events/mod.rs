use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Envelope carried on every topic (§6). `correlation_id` is the transport
/// partition key; same id ⇒ same partition ⇒ in-order delivery (§5).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub event_id: Uuid,
    pub correlation_id: String,
    pub timestamp: i64,
    pub source: String,
    pub version: String,
}

impl EventMetadata {
    pub fn new(event_id: Uuid, correlation_id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_id,
            correlation_id: correlation_id.into(),
            timestamp: crate::time::now_ms() as i64,
            source: source.into(),
            version: "1.0.0".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    PurchaseConfirmed,
    PurchaseCreated,
    TrainerAllocated,
    SessionsGenerated,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PurchaseConfirmed => "PURCHASE_CONFIRMED",
            Self::PurchaseCreated => "PURCHASE_CREATED",
            Self::TrainerAllocated => "TRAINER_ALLOCATED",
            Self::SessionsGenerated => "SESSIONS_GENERATED",
        }
    }

    /// Topic this event type is produced on (§6).
    pub fn topic(self) -> &'static str {
        match self {
            Self::PurchaseConfirmed => "purchase-confirmed",
            Self::PurchaseCreated => "purchase-created",
            Self::TrainerAllocated => "trainer-allocated",
            Self::SessionsGenerated => "sessions-generated",
        }
    }

    /// Ledger key a *consumer* uses to mark "I have handled this event",
    /// distinct from `as_str()`, which is the key the *producer*'s
    /// `IdempotentEmitter` uses to mark "I have emitted this event". Both
    /// land in the same `processed_events` table keyed on
    /// `(correlation_id, event_type)`; for a downstream hop the producer's
    /// emission row and the consumer's own correlation id are the same
    /// string (e.g. `purchaseId` for `PURCHASE_CREATED`), so sharing one
    /// namespace would make a handler see its own upstream emission as
    /// "already consumed" on the very first delivery. Keeping the two
    /// namespaces distinct is what makes E1 apply separately to each step.
    pub fn consumed_marker(self) -> &'static str {
        match self {
            Self::PurchaseConfirmed => "PURCHASE_CONFIRMED_CONSUMED",
            Self::PurchaseCreated => "PURCHASE_CREATED_CONSUMED",
            Self::TrainerAllocated => "TRAINER_ALLOCATED_CONSUMED",
            Self::SessionsGenerated => "SESSIONS_GENERATED_CONSUMED",
        }
    }
}

pub const DLQ_TOPIC: &str = "dead-letter-queue";

/// Pulls `_metadata.eventId` out of a raw envelope, falling back to a fresh
/// id for producers (e.g. the payment subsystem) that don't stamp one.
pub fn extract_event_id(payload: &Value) -> Uuid {
    payload
        .get("_metadata")
        .and_then(|m| m.get("eventId"))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
}

/// Pulls `studentId` out of a raw envelope body, where present.
pub fn extract_student_id(payload: &Value) -> Option<Uuid> {
    payload
        .get("studentId")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseConfirmed {
    pub payment_id: String,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub amount_cents: i64,
    pub metadata: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseCreated {
    pub purchase_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub purchase_tier: i32,
    pub metadata: Value,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerAllocated {
    pub allocation_id: Uuid,
    pub trainer_id: Option<Uuid>,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub session_count: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionsGenerated {
    pub allocation_id: Uuid,
    pub trainer_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub session_count: u32,
    pub session_ids: Vec<Uuid>,
    pub start_date: NaiveDate,
}


/// Payload written to `dead-letter-queue` on retry exhaustion (C4, §4.3).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DlqMessage {
    pub original_event: Value,
    pub original_topic: String,
    pub original_partition: i32,
    pub original_offset: i64,
    pub failure_reason: String,
    pub failure_timestamp: i64,
    pub attempts: u32,
    pub correlation_id: String,
    pub event_id: Uuid,
}
