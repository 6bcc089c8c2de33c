pub mod calendar;
pub mod hybrid;

pub use calendar::next_valid_dates;
pub use hybrid::{generate_hybrid_schedule, generate_plan, generate_uniform_schedule, session_metadata, PlannedSession};
