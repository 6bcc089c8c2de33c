use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use super::allocation::{ClassType, DeliveryMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Scheduled,
    Pending,
    Completed,
    Cancelled,
    Rescheduled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
            Self::Rescheduled => "RESCHEDULED",
        }
    }
}

/// ONLINE/OFFLINE split driving the 18/12 HYBRID ratio (S4).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionType {
    Online,
    Offline,
}

/// One materialised slot in a rolling session window (spec.md §3 Session).
///
/// Invariant S1: `session_number` is unique and monotonic within an
/// allocation's schedule, 1-indexed against the purchase's `total_sessions`.
/// Invariant S3: `scheduled_date` obeys the allocation's `delivery_mode`
/// calendar (weekday-daily skips Sat/Sun; Sunday-only picks Sundays).
/// Invariant S4: for `ClassType::Hybrid`, the `session_type` sequence across
/// the full 30-session schedule is a fixed 18 ONLINE / 12 OFFLINE split.
#[derive(Clone, Debug)]
pub struct Session {
    pub session_id: Uuid,
    pub allocation_id: Uuid,
    pub student_id: Uuid,
    pub trainer_id: Uuid,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    pub status: SessionStatus,
    pub session_type: SessionType,
    pub session_number: u32,
    /// HYBRID booking metadata (`isBookable`/`isFixedTime`/`initialTimeSlot`,
    /// §4.8); `{}` for non-HYBRID class types.
    pub metadata: Value,
}
