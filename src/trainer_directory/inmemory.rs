use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::Trainer;
use crate::error::AppError;

use super::{DirectoryFilters, TrainerDirectory};

/// Fixture-backed directory fake for tests. `always_fail` simulates the
/// directory being fully unavailable (S4: engine retries 3x, then
/// WAITLISTED) without needing a real flaky HTTP server.
pub struct InMemoryTrainerDirectory {
    trainers: Mutex<Vec<Trainer>>,
    always_fail: Mutex<bool>,
}

impl InMemoryTrainerDirectory {
    pub fn new(trainers: Vec<Trainer>) -> Self {
        Self {
            trainers: Mutex::new(trainers),
            always_fail: Mutex::new(false),
        }
    }

    pub fn set_always_fail(&self, fail: bool) {
        *self.always_fail.lock() = fail;
    }
}

#[async_trait]
impl TrainerDirectory for InMemoryTrainerDirectory {
    async fn fetch_candidates(&self, filters: &DirectoryFilters) -> Result<Vec<Trainer>, AppError> {
        if *self.always_fail.lock() {
            return Err(AppError::transient(anyhow::anyhow!("directory unreachable (fixture)")));
        }

        let matches = self
            .trainers
            .lock()
            .iter()
            .filter(|t| t.certified_course_ids.contains(&filters.course_id))
            .filter(|t| filters.franchise_id.is_none_or(|f| f == t.franchise_id))
            .cloned()
            .collect();
        Ok(matches)
    }
}
