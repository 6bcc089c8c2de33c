pub mod engine;
pub mod zone;

pub use engine::{cap_for_rating, AssignmentOutcome, AssignmentRequest, AutoAssignmentEngine};
pub use zone::{haversine_km, lookup_zone};
