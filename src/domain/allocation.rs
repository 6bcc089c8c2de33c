use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocationStatus {
    Pending,
    Approved,
    Active,
    Waitlisted,
}

impl AllocationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Active => "ACTIVE",
            Self::Waitlisted => "WAITLISTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(Self::Pending),
            "APPROVED" => Some(Self::Approved),
            "ACTIVE" => Some(Self::Active),
            "WAITLISTED" => Some(Self::Waitlisted),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryMode {
    WeekdayDaily,
    SundayOnly,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassType {
    OneOnOne,
    Hybrid,
}

/// Free-form scheduling preferences captured at allocation time, consumed by
/// the session generator (C7) and the periodic top-up sweep.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocationMetadata {
    /// "HH:MM" local slot; absent allocations fall back to the configured
    /// default only in the periodic sweep, never in the initial generation.
    pub preferred_time_slot: Option<String>,
    pub delivery_mode: DeliveryMode,
    pub class_type: ClassType,
    pub start_date: DateTime<Utc>,
}

/// Binds a purchase to a trainer (spec.md §3 Allocation).
///
/// Invariant A1: `trainer_id` is `None` exactly when `status == Waitlisted`.
/// Invariant A2: an allocation transitions `Pending -> Approved|Waitlisted`
/// exactly once per `(correlation_id, event_type)` pair via the idempotency
/// ledger, never re-entering `Pending`.
#[derive(Clone, Debug)]
pub struct Allocation {
    pub allocation_id: Uuid,
    pub student_id: Uuid,
    pub trainer_id: Option<Uuid>,
    pub course_id: Uuid,
    pub purchase_id: Uuid,
    pub status: AllocationStatus,
    pub created_at: DateTime<Utc>,
    pub metadata: AllocationMetadata,
}
