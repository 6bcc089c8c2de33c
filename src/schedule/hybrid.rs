use chrono::NaiveDate;
use serde_json::{json, Value};

use crate::domain::{ClassType, SessionType};
use crate::error::AppError;

use super::calendar::next_valid_dates;
use crate::domain::DeliveryMode;

/// One slot in a fully planned schedule, keyed by its 1-based position.
#[derive(Clone, Debug)]
pub struct PlannedSession {
    pub session_number: u32,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    pub session_type: SessionType,
    pub metadata: Value,
}

/// Sessions 1-6 ONLINE, then alternating ONLINE/OFFLINE from session 7
/// onward, yielding a fixed 18 ONLINE / 12 OFFLINE split over 30 sessions
/// (S4). Rejects anything but exactly 30.
pub fn generate_hybrid_schedule(total: u32) -> Result<Vec<SessionType>, AppError> {
    if total != 30 {
        return Err(AppError::Poison(format!(
            "HYBRID class type requires exactly 30 total sessions, got {total}"
        )));
    }

    let mut types = Vec::with_capacity(30);
    for session_number in 1..=30u32 {
        let session_type = if session_number <= 6 {
            SessionType::Online
        } else if (session_number - 7) % 2 == 0 {
            SessionType::Online
        } else {
            SessionType::Offline
        };
        types.push(session_type);
    }
    Ok(types)
}

/// Non-HYBRID class types run a uniform schedule at a single time slot;
/// every session is delivered the same way.
pub fn generate_uniform_schedule(total: u32) -> Vec<SessionType> {
    vec![SessionType::Online; total as usize]
}

fn generate_schedule(class_type: ClassType, total: u32) -> Result<Vec<SessionType>, AppError> {
    match class_type {
        ClassType::Hybrid => generate_hybrid_schedule(total),
        ClassType::OneOnOne => Ok(generate_uniform_schedule(total)),
    }
}

/// Per-session booking metadata (§4.8): OFFLINE sessions are reschedulable
/// around a floating slot, ONLINE sessions are pinned to the fixed slot.
pub fn session_metadata(session_type: SessionType, time_slot: &str) -> Value {
    match session_type {
        SessionType::Offline => json!({
            "isBookable": true,
            "isFixedTime": false,
            "initialTimeSlot": time_slot,
        }),
        SessionType::Online => json!({
            "isBookable": false,
            "isFixedTime": true,
        }),
    }
}

/// Plans the next `needed` sessions for an allocation whose schedule already
/// has `skip` materialised rows. `skip` is the count of *all* rows ever
/// created for the allocation (including completed/cancelled ones), not just
/// future ones — session numbering and the HYBRID ONLINE/OFFLINE split are
/// fixed by position in the full 1..=total_sessions schedule, so a gap from
/// completed sessions must not shift the numbering or the dates of the rows
/// still to be created.
pub fn generate_plan(
    class_type: ClassType,
    delivery_mode: DeliveryMode,
    start_date: NaiveDate,
    total_sessions: u32,
    skip: u32,
    needed: u32,
    time_slot: &str,
) -> Result<Vec<PlannedSession>, AppError> {
    if needed == 0 {
        return Ok(Vec::new());
    }

    let types = generate_schedule(class_type, total_sessions)?;
    let dates = next_valid_dates(start_date, (skip + needed) as usize, delivery_mode);

    let mut planned = Vec::with_capacity(needed as usize);
    for i in 0..needed {
        let session_number = skip + i + 1;
        let scheduled_date = dates[(skip + i) as usize];
        let session_type = types
            .get((session_number - 1) as usize)
            .copied()
            .unwrap_or(SessionType::Online);
        let metadata = session_metadata(session_type, time_slot);
        planned.push(PlannedSession {
            session_number,
            scheduled_date,
            scheduled_time: time_slot.to_string(),
            session_type,
            metadata,
        });
    }
    Ok(planned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_schedule_yields_18_online_12_offline_starting_online() {
        let types = generate_hybrid_schedule(30).unwrap();
        assert_eq!(types.len(), 30);
        assert!(types[0..6].iter().all(|t| *t == SessionType::Online));
        assert_eq!(types[6], SessionType::Online); // session 7
        assert_eq!(types[7], SessionType::Offline); // session 8

        let online = types.iter().filter(|t| **t == SessionType::Online).count();
        let offline = types.iter().filter(|t| **t == SessionType::Offline).count();
        assert_eq!(online, 18);
        assert_eq!(offline, 12);
    }

    #[test]
    fn hybrid_schedule_rejects_non_30_totals() {
        assert!(generate_hybrid_schedule(20).is_err());
        assert!(generate_hybrid_schedule(10).is_err());
    }

    #[test]
    fn hybrid_full_plan_spans_consecutive_weekdays() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let plan = generate_plan(ClassType::Hybrid, DeliveryMode::WeekdayDaily, start, 30, 0, 30, "16:00").unwrap();
        assert_eq!(plan.len(), 30);
        assert_eq!(plan[0].scheduled_date, start);
        assert_eq!(plan.last().unwrap().scheduled_date, NaiveDate::from_ymd_opt(2024, 7, 12).unwrap());

        let online = plan.iter().filter(|p| p.session_type == SessionType::Online).count();
        let offline = plan.iter().filter(|p| p.session_type == SessionType::Offline).count();
        assert_eq!(online, 18);
        assert_eq!(offline, 12);
    }

    #[test]
    fn topup_after_completions_keeps_numbering_and_dates_stable() {
        // S3: tier 30, 5 completed + 2 future already exist (skip=7), need 5 more.
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let plan = generate_plan(ClassType::OneOnOne, DeliveryMode::WeekdayDaily, start, 30, 7, 5, "16:00").unwrap();
        assert_eq!(plan.len(), 5);
        assert_eq!(plan[0].session_number, 8);
        assert_eq!(plan.last().unwrap().session_number, 12);
    }

    #[test]
    fn zero_needed_plans_nothing() {
        let start = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        let plan = generate_plan(ClassType::OneOnOne, DeliveryMode::WeekdayDaily, start, 30, 7, 0, "16:00").unwrap();
        assert!(plan.is_empty());
    }
}
