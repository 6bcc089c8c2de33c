use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::domain::allocation::{AllocationMetadata, AllocationStatus, ClassType, DeliveryMode};
use crate::domain::Allocation;

/// Non-terminal statuses per A1 — an allocation still competing for the
/// `(student_id, course_id)` slot.
const NON_TERMINAL: [&str; 3] = ["PENDING", "APPROVED", "ACTIVE"];

#[async_trait]
pub trait AllocationRepository: Send + Sync + 'static {
    async fn find_non_terminal(&self, student_id: Uuid, course_id: Uuid) -> anyhow::Result<Option<Allocation>>;

    /// Current non-terminal allocation count for a trainer, used by the
    /// assignment engine's load-cap filter (§4.6 step 4) before attempting
    /// a commit.
    async fn count_active_for_trainer(&self, trainer_id: Uuid) -> anyhow::Result<u32>;

    /// Attempts to commit `allocation`. When `allocation.trainer_id` is
    /// `Some`, re-verifies the trainer's load under `cap` inside the same
    /// transaction (§4.6 step 6 CAS re-check) and returns `false` without
    /// writing anything if the cap would be exceeded. `WAITLISTED`
    /// allocations (`trainer_id = None`) always commit.
    async fn try_commit(&self, allocation: &Allocation, cap: Option<u32>) -> anyhow::Result<bool>;

    /// Allocations eligible for the periodic session top-up sweep (§4.8):
    /// `APPROVED` or `ACTIVE`, i.e. ones with a real trainer assigned.
    async fn list_for_topup(&self) -> anyhow::Result<Vec<Allocation>>;

    async fn find_by_id(&self, allocation_id: Uuid) -> anyhow::Result<Option<Allocation>>;

    /// Looks up the allocation created for a given purchase, regardless of
    /// status — used to resolve a redelivered `PURCHASE_CREATED` whose prior
    /// attempt produced a `WAITLISTED` row (excluded from `NON_TERMINAL`).
    async fn find_by_purchase_id(&self, purchase_id: Uuid) -> anyhow::Result<Option<Allocation>>;
}

pub struct SqlxAllocationRepository {
    pool: AnyPool,
}

impl SqlxAllocationRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AllocationRepository for SqlxAllocationRepository {
    async fn find_non_terminal(&self, student_id: Uuid, course_id: Uuid) -> anyhow::Result<Option<Allocation>> {
        let placeholders = NON_TERMINAL
            .iter()
            .map(|_| "?")
            .collect::<Vec<_>>()
            .join(",");
        let query = format!(
            r#"SELECT id, student_id, trainer_id, course_id, purchase_id, status, metadata, created_at
               FROM trainer_allocations
               WHERE student_id = ? AND course_id = ? AND status IN ({placeholders});"#
        );

        let mut q = sqlx::query(&query)
            .bind(student_id.to_string())
            .bind(course_id.to_string());
        for s in NON_TERMINAL {
            q = q.bind(s);
        }
        let row = q.fetch_optional(&self.pool).await?;

        match row {
            Some(r) => Ok(Some(row_to_allocation(&r)?)),
            None => Ok(None),
        }
    }

    async fn count_active_for_trainer(&self, trainer_id: Uuid) -> anyhow::Result<u32> {
        let row = sqlx::query(
            r#"SELECT COUNT(*) AS n FROM trainer_allocations
               WHERE trainer_id = ? AND status IN ('PENDING','APPROVED','ACTIVE');"#,
        )
        .bind(trainer_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        let n: i64 = row.try_get("n")?;
        Ok(n as u32)
    }

    async fn try_commit(&self, allocation: &Allocation, cap: Option<u32>) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        if let (Some(trainer_id), Some(cap)) = (allocation.trainer_id, cap) {
            let row = sqlx::query(
                r#"SELECT COUNT(*) AS n FROM trainer_allocations
                   WHERE trainer_id = ? AND status IN ('PENDING','APPROVED','ACTIVE');"#,
            )
            .bind(trainer_id.to_string())
            .fetch_one(&mut *tx)
            .await?;
            let current: i64 = row.try_get("n")?;
            if current as u32 >= cap {
                tx.rollback().await?;
                return Ok(false);
            }
        }

        let metadata = serde_json::to_string(&allocation.metadata)?;
        sqlx::query(
            r#"INSERT INTO trainer_allocations
                 (id, student_id, trainer_id, course_id, purchase_id, status, metadata, created_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?);"#,
        )
        .bind(allocation.allocation_id.to_string())
        .bind(allocation.student_id.to_string())
        .bind(allocation.trainer_id.map(|t| t.to_string()))
        .bind(allocation.course_id.to_string())
        .bind(allocation.purchase_id.to_string())
        .bind(allocation.status.as_str())
        .bind(metadata)
        .bind(allocation.created_at.timestamp_millis())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn list_for_topup(&self) -> anyhow::Result<Vec<Allocation>> {
        let rows = sqlx::query(
            r#"SELECT id, student_id, trainer_id, course_id, purchase_id, status, metadata, created_at
               FROM trainer_allocations WHERE status IN ('APPROVED','ACTIVE');"#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_allocation).collect()
    }

    async fn find_by_id(&self, allocation_id: Uuid) -> anyhow::Result<Option<Allocation>> {
        let row = sqlx::query(
            r#"SELECT id, student_id, trainer_id, course_id, purchase_id, status, metadata, created_at
               FROM trainer_allocations WHERE id = ?;"#,
        )
        .bind(allocation_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_allocation(&r)?)),
            None => Ok(None),
        }
    }

    async fn find_by_purchase_id(&self, purchase_id: Uuid) -> anyhow::Result<Option<Allocation>> {
        let row = sqlx::query(
            r#"SELECT id, student_id, trainer_id, course_id, purchase_id, status, metadata, created_at
               FROM trainer_allocations WHERE purchase_id = ?;"#,
        )
        .bind(purchase_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(Some(row_to_allocation(&r)?)),
            None => Ok(None),
        }
    }
}

fn row_to_allocation(r: &sqlx::any::AnyRow) -> anyhow::Result<Allocation> {
    use chrono::{DateTime, Utc};

    let id: String = r.try_get("id")?;
    let student_id: String = r.try_get("student_id")?;
    let trainer_id: Option<String> = r.try_get("trainer_id")?;
    let course_id: String = r.try_get("course_id")?;
    let purchase_id: String = r.try_get("purchase_id")?;
    let status: String = r.try_get("status")?;
    let metadata: String = r.try_get("metadata")?;
    let created_at: i64 = r.try_get("created_at")?;

    let raw: serde_json::Value = serde_json::from_str(&metadata)?;
    let metadata = AllocationMetadata {
        preferred_time_slot: raw.get("preferred_time_slot").and_then(|v| v.as_str()).map(String::from),
        delivery_mode: match raw.get("delivery_mode").and_then(|v| v.as_str()) {
            Some("SUNDAY_ONLY") => DeliveryMode::SundayOnly,
            _ => DeliveryMode::WeekdayDaily,
        },
        class_type: match raw.get("class_type").and_then(|v| v.as_str()) {
            Some("HYBRID") => ClassType::Hybrid,
            _ => ClassType::OneOnOne,
        },
        start_date: raw
            .get("start_date")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(Utc::now),
    };

    Ok(Allocation {
        allocation_id: Uuid::parse_str(&id)?,
        student_id: Uuid::parse_str(&student_id)?,
        trainer_id: trainer_id.map(|t| Uuid::parse_str(&t)).transpose()?,
        course_id: Uuid::parse_str(&course_id)?,
        purchase_id: Uuid::parse_str(&purchase_id)?,
        status: AllocationStatus::from_str(&status)
            .ok_or_else(|| anyhow::anyhow!("invalid allocation status {status}"))?,
        created_at: DateTime::<Utc>::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
        metadata,
    })
}
