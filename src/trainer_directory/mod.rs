pub mod http;
pub mod inmemory;
pub mod repository_backed;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::Trainer;
use crate::error::AppError;

/// Filters passed to the directory's candidate fetch (§4.6 step 1).
#[derive(Clone, Debug)]
pub struct DirectoryFilters {
    pub course_id: Uuid,
    pub franchise_id: Option<Uuid>,
}

/// The trainer directory named as an external collaborator by the
/// auto-assignment engine (C14). This core does not own trainer profile
/// storage (§1 Non-goals); it only consumes a candidate list shaped like
/// [`Trainer`].
#[async_trait]
pub trait TrainerDirectory: Send + Sync + 'static {
    async fn fetch_candidates(&self, filters: &DirectoryFilters) -> Result<Vec<Trainer>, AppError>;
}
