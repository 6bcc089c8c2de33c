use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// Purchased session count, determining unlock depth (P2).
///
/// `10 -> foundation only`, `20 -> foundation+development`, `30 -> all`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum PurchaseTier {
    Ten,
    Twenty,
    Thirty,
}

impl PurchaseTier {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            10 => Some(Self::Ten),
            20 => Some(Self::Twenty),
            30 => Some(Self::Thirty),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Self::Ten => 10,
            Self::Twenty => 20,
            Self::Thirty => 30,
        }
    }

    /// Highest course-level rank unlocked by this tier (foundation=1,
    /// development=2, mastery=3).
    pub fn max_level_rank(self) -> i32 {
        match self {
            Self::Ten => 1,
            Self::Twenty => 2,
            Self::Thirty => 3,
        }
    }

    pub fn total_sessions(self) -> u32 {
        self.as_i32() as u32
    }
}

/// Owns one student-course entitlement (spec.md §3 Purchase).
///
/// Invariant P1: at most one `is_active=true` row per `(student_id, course_id)`.
/// Invariant P2: `purchase_tier` determines which course levels are unlocked.
#[derive(Clone, Debug)]
pub struct Purchase {
    pub purchase_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub purchase_tier: PurchaseTier,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expiry_date: Option<DateTime<Utc>>,
    pub metadata: Value,
}
