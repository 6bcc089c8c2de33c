pub mod allocation;
pub mod processed_event;
pub mod purchase;
pub mod session;
pub mod trainer;
pub mod zone;

pub use allocation::{Allocation, AllocationMetadata, AllocationStatus};
pub use processed_event::ProcessedEvent;
pub use purchase::{Purchase, PurchaseTier};
pub use session::{ClassType, DeliveryMode, Session, SessionStatus, SessionType};
pub use trainer::{Trainer, TrainerCandidate};
pub use zone::ServiceCluster;
