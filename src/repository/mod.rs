pub mod allocation;
pub mod purchase;
pub mod refresh_token;
pub mod schedule_slot;
pub mod session;
pub mod trainer;
pub mod zone;

pub use allocation::{AllocationRepository, SqlxAllocationRepository};
pub use purchase::{PurchaseRepository, SqlxPurchaseRepository};
pub use refresh_token::{RefreshTokenRepository, SqlxRefreshTokenRepository};
pub use schedule_slot::{ScheduleSlotRepository, SqlxScheduleSlotRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use trainer::{SqlxTrainerRepository, TrainerRepository};
pub use zone::{SqlxZoneRepository, ZoneRepository};
