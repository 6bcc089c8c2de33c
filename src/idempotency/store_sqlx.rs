use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use crate::domain::ProcessedEvent;
use crate::time::now_ms;

use super::store::{IdempotencyStore, MarkOutcome};

pub struct SqlxIdempotencyStore {
    pool: AnyPool,
}

impl SqlxIdempotencyStore {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl IdempotencyStore for SqlxIdempotencyStore {
    async fn lookup(&self, correlation_id: &str, event_type: &str) -> anyhow::Result<Option<Uuid>> {
        let row = sqlx::query(
            r#"SELECT event_id FROM processed_events WHERE correlation_id = ? AND event_type = ?;"#,
        )
        .bind(correlation_id)
        .bind(event_type)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => {
                let id: String = r.try_get("event_id")?;
                Ok(Some(Uuid::parse_str(&id)?))
            }
            None => Ok(None),
        }
    }

    async fn mark(
        &self,
        event_id: Uuid,
        correlation_id: &str,
        event_type: &str,
        payload: &Value,
        source: &str,
        version: &str,
    ) -> anyhow::Result<MarkOutcome> {
        let payload_str = serde_json::to_string(payload)?;
        let result = sqlx::query(
            r#"
INSERT INTO processed_events
  (event_id, event_type, correlation_id, payload, source, version, processed_at)
VALUES (?, ?, ?, ?, ?, ?, ?);
"#,
        )
        .bind(event_id.to_string())
        .bind(event_type)
        .bind(correlation_id)
        .bind(payload_str)
        .bind(source)
        .bind(version)
        .bind(now_ms() as i64)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(MarkOutcome::Recorded),
            Err(e) if is_unique_violation(&e) => Ok(MarkOutcome::AlreadyPresent),
            Err(e) => Err(e.into()),
        }
    }

    async fn get(&self, event_id: Uuid) -> anyhow::Result<Option<ProcessedEvent>> {
        let row = sqlx::query(
            r#"
SELECT event_id, correlation_id, event_type, payload, source, processed_at
FROM processed_events WHERE event_id = ?;
"#,
        )
        .bind(event_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else { return Ok(None) };
        let id: String = r.try_get("event_id")?;
        let payload: String = r.try_get("payload")?;
        let processed_at: i64 = r.try_get("processed_at")?;

        Ok(Some(ProcessedEvent {
            event_id: Uuid::parse_str(&id)?,
            correlation_id: r.try_get("correlation_id")?,
            event_type: r.try_get("event_type")?,
            payload: serde_json::from_str(&payload)?,
            source: r.try_get("source")?,
            processed_at: DateTime::<Utc>::from_timestamp_millis(processed_at)
                .unwrap_or_else(Utc::now),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::any::AnyPoolOptions;

    async fn test_pool() -> AnyPool {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::schema::migrate(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn second_mark_on_same_correlation_and_type_is_already_present() {
        let pool = test_pool().await;
        let store = SqlxIdempotencyStore::new(pool);

        let first = store
            .mark(Uuid::new_v4(), "corr-1", "PURCHASE_CONFIRMED", &serde_json::json!({}), "test", "1.0.0")
            .await
            .unwrap();
        assert_eq!(first, MarkOutcome::Recorded);

        let second = store
            .mark(Uuid::new_v4(), "corr-1", "PURCHASE_CONFIRMED", &serde_json::json!({}), "test", "1.0.0")
            .await
            .unwrap();
        assert_eq!(second, MarkOutcome::AlreadyPresent);
    }

    #[tokio::test]
    async fn lookup_returns_stored_event_id() {
        let pool = test_pool().await;
        let store = SqlxIdempotencyStore::new(pool);
        let id = Uuid::new_v4();

        store
            .mark(id, "corr-2", "PURCHASE_CREATED", &serde_json::json!({}), "test", "1.0.0")
            .await
            .unwrap();

        let found = store.lookup("corr-2", "PURCHASE_CREATED").await.unwrap();
        assert_eq!(found, Some(id));
    }
}
