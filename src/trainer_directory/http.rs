use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;

use crate::domain::Trainer;
use crate::error::AppError;

use super::{DirectoryFilters, TrainerDirectory};

/// Wire shape returned by the directory service; distinct from [`Trainer`]
/// so a field rename or extension on their side doesn't leak into our
/// domain type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrainerDto {
    trainer_id: Uuid,
    active: bool,
    certified_course_ids: Vec<Uuid>,
    franchise_id: Uuid,
    home_lat: Option<f64>,
    home_lng: Option<f64>,
    rating: f64,
    accept_more_allocations: bool,
}

impl From<TrainerDto> for Trainer {
    fn from(dto: TrainerDto) -> Self {
        Trainer {
            trainer_id: dto.trainer_id,
            active: dto.active,
            certified_course_ids: dto.certified_course_ids,
            franchise_id: dto.franchise_id,
            home_lat: dto.home_lat.unwrap_or_default(),
            home_lng: dto.home_lng.unwrap_or_default(),
            rating: dto.rating,
            accept_more_allocations: dto.accept_more_allocations,
        }
    }
}

/// HTTP adapter for the trainer directory (§4.11). A 10s per-call timeout
/// (§5) is enforced by the client itself rather than an outer
/// `tokio::time::timeout`, matching `reqwest`'s own budget knob.
pub struct HttpTrainerDirectory {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTrainerDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl TrainerDirectory for HttpTrainerDirectory {
    async fn fetch_candidates(&self, filters: &DirectoryFilters) -> Result<Vec<Trainer>, AppError> {
        let mut request = self
            .client
            .get(format!("{}/trainers", self.base_url))
            .query(&[("courseId", filters.course_id.to_string())]);

        if let Some(franchise_id) = filters.franchise_id {
            request = request.query(&[("franchiseId", franchise_id.to_string())]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::transient(anyhow::anyhow!("trainer directory request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::transient(anyhow::anyhow!(
                "trainer directory returned status {}",
                response.status()
            )));
        }

        let dtos: Vec<TrainerDto> = response
            .json()
            .await
            .map_err(|e| AppError::transient(anyhow::anyhow!("trainer directory response malformed: {e}")))?;

        Ok(dtos.into_iter().map(Trainer::from).collect())
    }
}
