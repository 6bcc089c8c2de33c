use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::domain::session::SessionType;
use crate::domain::Session;

#[async_trait]
pub trait SessionRepository: Send + Sync + 'static {
    /// Rows with `status IN (SCHEDULED, PENDING)` and `scheduled_date >= today`
    /// for one allocation — the rolling-window count (S2).
    async fn count_future(&self, allocation_id: Uuid, today: NaiveDate) -> anyhow::Result<u32>;

    /// Inserts `sessions`, relying on the `(allocation_id, scheduled_date,
    /// scheduled_time)` unique index for idempotency (S1). Returns the ids
    /// of rows that were newly created — rows that already existed (a
    /// replay) are silently skipped and excluded from the result, which is
    /// how the caller decides whether to emit `SESSIONS_GENERATED`.
    async fn insert_sessions(&self, sessions: &[Session]) -> anyhow::Result<Vec<Uuid>>;

    /// All rows ever created for an allocation, any status. The periodic
    /// top-up and the HYBRID schedule rely on this (not `count_future`) to
    /// know where in the fixed 1..=total_sessions schedule to resume, so
    /// that completed sessions don't shift numbering or dates (S3).
    async fn count_total(&self, allocation_id: Uuid) -> anyhow::Result<u32>;
}

pub struct SqlxSessionRepository {
    pool: AnyPool,
}

impl SqlxSessionRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for SqlxSessionRepository {
    async fn count_future(&self, allocation_id: Uuid, today: NaiveDate) -> anyhow::Result<u32> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS n FROM tutoring_sessions
               WHERE allocation_id = ? AND status IN ('SCHEDULED','PENDING') AND scheduled_date >= ?;"#,
        )
        .bind(allocation_id.to_string())
        .bind(today.to_string())
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u32)
    }

    async fn insert_sessions(&self, sessions: &[Session]) -> anyhow::Result<Vec<Uuid>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::new();

        for s in sessions {
            let session_type = match s.session_type {
                SessionType::Online => "ONLINE",
                SessionType::Offline => "OFFLINE",
            };
            let result = sqlx::query(
                r#"INSERT INTO tutoring_sessions
                     (id, allocation_id, student_id, trainer_id, scheduled_date, scheduled_time,
                      status, session_type, session_number, metadata, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(allocation_id, scheduled_date, scheduled_time) DO NOTHING;"#,
            )
            .bind(s.session_id.to_string())
            .bind(s.allocation_id.to_string())
            .bind(s.student_id.to_string())
            .bind(s.trainer_id.to_string())
            .bind(s.scheduled_date.to_string())
            .bind(&s.scheduled_time)
            .bind(s.status.as_str())
            .bind(session_type)
            .bind(s.session_number)
            .bind(s.metadata.to_string())
            .bind(crate::time::now_ms() as i64)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 1 {
                created.push(s.session_id);
            }
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn count_total(&self, allocation_id: Uuid) -> anyhow::Result<u32> {
        let row = sqlx::query(r#"SELECT COUNT(*) AS n FROM tutoring_sessions WHERE allocation_id = ?;"#)
            .bind(allocation_id.to_string())
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u32)
    }
}
