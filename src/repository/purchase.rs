use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::domain::{Purchase, PurchaseTier};

/// Persistence for `course_purchases`/`course_levels`/`student_progress`.
///
/// `record_purchase` performs P1 (deactivate-before-insert) and P2 (unlock
/// rows) in one transaction — the worker above it is responsible only for
/// the idempotency check and event emission around the call.
#[async_trait]
pub trait PurchaseRepository: Send + Sync + 'static {
    async fn course_exists(&self, course_id: Uuid) -> anyhow::Result<bool>;

    async fn record_purchase(&self, purchase: &Purchase) -> anyhow::Result<()>;

    async fn find_active(&self, student_id: Uuid, course_id: Uuid) -> anyhow::Result<Option<Purchase>>;

    async fn find_by_id(&self, purchase_id: Uuid) -> anyhow::Result<Option<Purchase>>;
}

pub struct SqlxPurchaseRepository {
    pool: AnyPool,
}

impl SqlxPurchaseRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PurchaseRepository for SqlxPurchaseRepository {
    async fn course_exists(&self, course_id: Uuid) -> anyhow::Result<bool> {
        let row = sqlx::query(r#"SELECT 1 AS present FROM course_levels WHERE course_id = ? LIMIT 1;"#)
            .bind(course_id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn record_purchase(&self, purchase: &Purchase) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"UPDATE course_purchases SET is_active = FALSE
               WHERE student_id = ? AND course_id = ? AND is_active = TRUE;"#,
        )
        .bind(purchase.student_id.to_string())
        .bind(purchase.course_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"INSERT INTO course_purchases
                 (id, student_id, course_id, purchase_tier, is_active, created_at, expiry_date, metadata)
               VALUES (?, ?, ?, ?, TRUE, ?, ?, ?);"#,
        )
        .bind(purchase.purchase_id.to_string())
        .bind(purchase.student_id.to_string())
        .bind(purchase.course_id.to_string())
        .bind(purchase.purchase_tier.as_i32())
        .bind(purchase.created_at.timestamp_millis())
        .bind(purchase.expiry_date.map(|d| d.timestamp_millis()))
        .bind(purchase.metadata.to_string())
        .execute(&mut *tx)
        .await?;

        let levels = sqlx::query(
            r#"SELECT id FROM course_levels WHERE course_id = ? AND level_rank <= ?;"#,
        )
        .bind(purchase.course_id.to_string())
        .bind(purchase.purchase_tier.max_level_rank())
        .fetch_all(&mut *tx)
        .await?;

        for level in levels {
            let level_id: String = level.try_get("id")?;
            let catalog_sessions = sqlx::query(
                r#"SELECT id, session_number FROM course_catalog_sessions
                   WHERE level_id = ? AND session_number <= ?;"#,
            )
            .bind(&level_id)
            .bind(purchase.purchase_tier.as_i32())
            .fetch_all(&mut *tx)
            .await?;

            for cs in catalog_sessions {
                let catalog_session_id: String = cs.try_get("id")?;
                sqlx::query(
                    r#"INSERT INTO student_progress (id, student_id, catalog_session_id, is_unlocked)
                       VALUES (?, ?, ?, TRUE)
                       ON CONFLICT(student_id, catalog_session_id) DO UPDATE SET is_unlocked = TRUE;"#,
                )
                .bind(Uuid::new_v4().to_string())
                .bind(purchase.student_id.to_string())
                .bind(&catalog_session_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_active(&self, student_id: Uuid, course_id: Uuid) -> anyhow::Result<Option<Purchase>> {
        let row = sqlx::query(
            r#"SELECT id, student_id, course_id, purchase_tier, is_active, created_at, expiry_date, metadata
               FROM course_purchases WHERE student_id = ? AND course_id = ? AND is_active = TRUE;"#,
        )
        .bind(student_id.to_string())
        .bind(course_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else { return Ok(None) };
        row_to_purchase(&r).map(Some)
    }

    async fn find_by_id(&self, purchase_id: Uuid) -> anyhow::Result<Option<Purchase>> {
        let row = sqlx::query(
            r#"SELECT id, student_id, course_id, purchase_tier, is_active, created_at, expiry_date, metadata
               FROM course_purchases WHERE id = ?;"#,
        )
        .bind(purchase_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else { return Ok(None) };
        row_to_purchase(&r).map(Some)
    }
}

fn row_to_purchase(r: &sqlx::any::AnyRow) -> anyhow::Result<Purchase> {
    use chrono::{DateTime, Utc};

    let id: String = r.try_get("id")?;
    let student_id: String = r.try_get("student_id")?;
    let course_id: String = r.try_get("course_id")?;
    let tier: i32 = r.try_get("purchase_tier")?;
    let is_active: bool = r.try_get("is_active")?;
    let created_at: i64 = r.try_get("created_at")?;
    let expiry_date: Option<i64> = r.try_get("expiry_date")?;
    let metadata: String = r.try_get("metadata")?;

    Ok(Purchase {
        purchase_id: Uuid::parse_str(&id)?,
        student_id: Uuid::parse_str(&student_id)?,
        course_id: Uuid::parse_str(&course_id)?,
        purchase_tier: PurchaseTier::from_i32(tier)
            .ok_or_else(|| anyhow::anyhow!("invalid purchase tier {tier}"))?,
        is_active,
        created_at: DateTime::<Utc>::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
        expiry_date: expiry_date.and_then(DateTime::<Utc>::from_timestamp_millis),
        metadata: serde_json::from_str(&metadata)?,
    })
}
