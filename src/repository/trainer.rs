use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::domain::Trainer;

/// Backing store for a self-hosted trainer directory (§4.6 step 1 names the
/// directory an external collaborator; this is the implementation used when
/// no separate directory service exists — see `trainer_directory`).
#[async_trait]
pub trait TrainerRepository: Send + Sync + 'static {
    async fn certified_active(&self, course_id: Uuid, franchise_id: Option<Uuid>) -> anyhow::Result<Vec<Trainer>>;
}

pub struct SqlxTrainerRepository {
    pool: AnyPool,
}

impl SqlxTrainerRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrainerRepository for SqlxTrainerRepository {
    async fn certified_active(&self, course_id: Uuid, franchise_id: Option<Uuid>) -> anyhow::Result<Vec<Trainer>> {
        let rows = match franchise_id {
            Some(franchise_id) => {
                sqlx::query(
                    r#"SELECT t.id, t.active, t.franchise_id, t.home_lat, t.home_lng, t.rating, t.accept_more_allocations
                       FROM trainers t
                       JOIN trainer_certifications c ON c.trainer_id = t.id
                       WHERE c.course_id = ? AND t.active = TRUE AND t.franchise_id = ?;"#,
                )
                .bind(course_id.to_string())
                .bind(franchise_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"SELECT t.id, t.active, t.franchise_id, t.home_lat, t.home_lng, t.rating, t.accept_more_allocations
                       FROM trainers t
                       JOIN trainer_certifications c ON c.trainer_id = t.id
                       WHERE c.course_id = ? AND t.active = TRUE;"#,
                )
                .bind(course_id.to_string())
                .fetch_all(&self.pool)
                .await?
            }
        };

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let id: String = r.try_get("id")?;
            let franchise_id: String = r.try_get("franchise_id")?;
            out.push(Trainer {
                trainer_id: Uuid::parse_str(&id)?,
                active: true,
                certified_course_ids: vec![course_id],
                franchise_id: Uuid::parse_str(&franchise_id)?,
                home_lat: r.try_get("home_lat")?,
                home_lng: r.try_get("home_lng")?,
                rating: r.try_get("rating")?,
                accept_more_allocations: r.try_get("accept_more_allocations")?,
            });
        }
        Ok(out)
    }
}
