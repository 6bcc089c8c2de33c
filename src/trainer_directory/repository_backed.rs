use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::Trainer;
use crate::error::AppError;
use crate::repository::TrainerRepository;

use super::{DirectoryFilters, TrainerDirectory};

/// Bridges the trainer directory trait directly onto this core's own
/// `trainers` table (§6), for deployments that haven't stood up a separate
/// directory service yet. Same trait, same engine, swappable backend.
pub struct RepositoryTrainerDirectory {
    repo: Arc<dyn TrainerRepository>,
}

impl RepositoryTrainerDirectory {
    pub fn new(repo: Arc<dyn TrainerRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TrainerDirectory for RepositoryTrainerDirectory {
    async fn fetch_candidates(&self, filters: &DirectoryFilters) -> Result<Vec<Trainer>, AppError> {
        self.repo
            .certified_active(filters.course_id, filters.franchise_id)
            .await
            .map_err(AppError::transient)
    }
}
