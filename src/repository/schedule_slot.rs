use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

/// Tracks which trainer is already booked at a given date/time, used by the
/// assignment engine's hard filter for conflicting bookings (§4.6 step 2).
#[async_trait]
pub trait ScheduleSlotRepository: Send + Sync + 'static {
    async fn has_conflict(&self, trainer_id: Uuid, date: NaiveDate, time_slot: &str) -> anyhow::Result<bool>;

    async fn reserve(&self, trainer_id: Uuid, date: NaiveDate, time_slot: &str) -> anyhow::Result<()>;
}

pub struct SqlxScheduleSlotRepository {
    pool: AnyPool,
}

impl SqlxScheduleSlotRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ScheduleSlotRepository for SqlxScheduleSlotRepository {
    async fn has_conflict(&self, trainer_id: Uuid, date: NaiveDate, time_slot: &str) -> anyhow::Result<bool> {
        let row = sqlx::query(
            r#"SELECT 1 AS present FROM schedule_slots
               WHERE trainer_id = ? AND slot_date = ? AND slot_time = ?;"#,
        )
        .bind(trainer_id.to_string())
        .bind(date.to_string())
        .bind(time_slot)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    async fn reserve(&self, trainer_id: Uuid, date: NaiveDate, time_slot: &str) -> anyhow::Result<()> {
        sqlx::query(
            r#"INSERT INTO schedule_slots (trainer_id, slot_date, slot_time)
               VALUES (?, ?, ?) ON CONFLICT(trainer_id, slot_date, slot_time) DO NOTHING;"#,
        )
        .bind(trainer_id.to_string())
        .bind(date.to_string())
        .bind(time_slot)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
