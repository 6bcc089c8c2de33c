use uuid::Uuid;

/// A trainer eligible for allocation (SPEC_FULL §3).
///
/// `certified_course_ids` gates eligibility; `home_lat`/`home_lng` feed the
/// Haversine distance cap in the assignment engine (C10); `rating` breaks
/// ties among candidates within the distance cap; `accept_more_allocations`
/// is the trainer-side load cap toggle.
#[derive(Clone, Debug)]
pub struct Trainer {
    pub trainer_id: Uuid,
    pub active: bool,
    pub certified_course_ids: Vec<Uuid>,
    pub franchise_id: Uuid,
    pub home_lat: f64,
    pub home_lng: f64,
    pub rating: f64,
    pub accept_more_allocations: bool,
}

/// A trainer scored against one allocation request, produced by the
/// eligibility filter and consumed by the ranking step (§4.7).
#[derive(Clone, Debug)]
pub struct TrainerCandidate {
    pub trainer_id: Uuid,
    pub distance_km: f64,
    pub rating: f64,
    pub current_load: u32,
}
