use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::domain::{Purchase, PurchaseTier};
use crate::error::AppError;
use crate::events::{EventType, PurchaseConfirmed};
use crate::idempotency::{IdempotencyStore, IdempotentEmitter};
use crate::metrics::Counters;
use crate::repository::PurchaseRepository;
use crate::time::now_ms;
use crate::transport::InboundMessage;

/// Consumes `PURCHASE_CONFIRMED`, records the purchase + unlock rows, emits
/// `PURCHASE_CREATED` (§4.4).
pub struct PurchaseWorker {
    purchases: Arc<dyn PurchaseRepository>,
    idempotency: Arc<dyn IdempotencyStore>,
    emitter: Arc<IdempotentEmitter>,
    metrics: Arc<Counters>,
}

impl PurchaseWorker {
    pub fn new(
        purchases: Arc<dyn PurchaseRepository>,
        idempotency: Arc<dyn IdempotencyStore>,
        emitter: Arc<IdempotentEmitter>,
        metrics: Arc<Counters>,
    ) -> Self {
        Self {
            purchases,
            idempotency,
            emitter,
            metrics,
        }
    }

    pub async fn handle(&self, msg: InboundMessage) -> Result<(), AppError> {
        let event: PurchaseConfirmed = serde_json::from_value(msg.payload.clone())
            .map_err(|e| AppError::Poison(format!("malformed PURCHASE_CONFIRMED payload: {e}")))?;
        let correlation_id = msg.key.clone();

        let already_processed = self
            .idempotency
            .lookup(&correlation_id, EventType::PurchaseConfirmed.consumed_marker())
            .await
            .map_err(AppError::transient)?
            .is_some();

        let purchase = if already_processed {
            // Step 1-6 already ran on a prior attempt; only step 7 (emit,
            // which is itself idempotent) may still be outstanding.
            self.purchases
                .find_active(event.student_id, event.course_id)
                .await
                .map_err(AppError::transient)?
                .ok_or_else(|| {
                    AppError::Poison(format!(
                        "PURCHASE_CONFIRMED {correlation_id} marked processed but no active purchase found"
                    ))
                })?
        } else {
            if !self
                .purchases
                .course_exists(event.course_id)
                .await
                .map_err(AppError::transient)?
            {
                self.metrics.purchases_rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(AppError::Poison(format!("unknown course {}", event.course_id)));
            }

            let tier_value = event
                .metadata
                .get("purchaseTier")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| AppError::Poison("metadata.purchaseTier missing".to_string()))?;
            let purchase_tier = PurchaseTier::from_i32(tier_value as i32).ok_or_else(|| {
                self.metrics.purchases_rejected.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                AppError::Poison(format!("purchaseTier {tier_value} not in {{10,20,30}}"))
            })?;

            let purchase = Purchase {
                purchase_id: Uuid::new_v4(),
                student_id: event.student_id,
                course_id: event.course_id,
                purchase_tier,
                is_active: true,
                created_at: chrono::DateTime::<chrono::Utc>::from_timestamp_millis(now_ms() as i64)
                    .unwrap_or_else(chrono::Utc::now),
                expiry_date: None,
                metadata: event.metadata.clone(),
            };

            self.purchases.record_purchase(&purchase).await.map_err(AppError::transient)?;

            self.idempotency
                .mark(
                    Uuid::new_v4(),
                    &correlation_id,
                    EventType::PurchaseConfirmed.consumed_marker(),
                    &msg.payload,
                    "purchase-worker",
                    "1.0.0",
                )
                .await
                .map_err(AppError::transient)?;

            self.metrics.purchases_created.fetch_add(1, std::sync::atomic::Ordering::Relaxed);

            purchase
        };

        let body = json!({
            "purchaseId": purchase.purchase_id,
            "studentId": purchase.student_id,
            "courseId": purchase.course_id,
            "purchaseTier": purchase.purchase_tier.as_i32(),
            "metadata": purchase.metadata,
        });

        // Re-keyed on the new entity (purchaseId), not the inbound paymentId
        // (§6: `purchase-created` partitions on purchaseId).
        self.emitter
            .emit(EventType::PurchaseCreated, &purchase.purchase_id.to_string(), &body)
            .await
            .map_err(AppError::transient)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idempotency::SqlxIdempotencyStore;
    use crate::metrics::Counters;
    use crate::repository::SqlxPurchaseRepository;
    use crate::transport::inmemory::InMemoryTransport;
    use sqlx::any::AnyPoolOptions;

    async fn harness() -> (PurchaseWorker, Arc<InMemoryTransport>, sqlx::AnyPool) {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::db::schema::migrate(&pool).await.unwrap();

        let course_id = Uuid::new_v4();
        sqlx::query("INSERT INTO course_levels (id, course_id, level_rank) VALUES (?, ?, 1);")
            .bind(Uuid::new_v4().to_string())
            .bind(course_id.to_string())
            .execute(&pool)
            .await
            .unwrap();

        let purchases: Arc<dyn PurchaseRepository> = Arc::new(SqlxPurchaseRepository::new(pool.clone()));
        let idempotency: Arc<dyn IdempotencyStore> = Arc::new(SqlxIdempotencyStore::new(pool.clone()));
        let transport = InMemoryTransport::shared(3);
        let emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "purchase-worker"));
        let worker = PurchaseWorker::new(purchases, idempotency, emitter, Arc::new(Counters::default()));
        (worker, transport, pool)
    }

    fn confirmed_message(course_id: Uuid, student_id: Uuid, payment_id: &str) -> InboundMessage {
        let payload = serde_json::json!({
            "paymentId": payment_id,
            "studentId": student_id,
            "courseId": course_id,
            "amountCents": 500_00,
            "metadata": { "purchaseTier": 30 },
        });
        InboundMessage {
            topic: "purchase-confirmed".to_string(),
            partition: 0,
            offset: 0,
            key: payment_id.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn records_purchase_and_emits_purchase_created() {
        let (worker, transport, pool) = harness().await;
        let course_id: String = sqlx::query_scalar("SELECT course_id FROM course_levels LIMIT 1;")
            .fetch_one(&pool)
            .await
            .unwrap();
        let course_id = Uuid::parse_str(&course_id).unwrap();
        let student_id = Uuid::new_v4();

        worker.handle(confirmed_message(course_id, student_id, "pay-1")).await.unwrap();

        let msg = transport.poll("purchase-created", "g").await.unwrap().unwrap();
        assert_eq!(msg.payload["studentId"], student_id.to_string());
        assert_eq!(msg.payload["purchaseTier"], 30);
    }

    #[tokio::test]
    async fn replay_does_not_duplicate_the_purchase_row() {
        let (worker, transport, pool) = harness().await;
        let course_id: String = sqlx::query_scalar("SELECT course_id FROM course_levels LIMIT 1;")
            .fetch_one(&pool)
            .await
            .unwrap();
        let course_id = Uuid::parse_str(&course_id).unwrap();
        let student_id = Uuid::new_v4();

        worker.handle(confirmed_message(course_id, student_id, "pay-2")).await.unwrap();
        worker.handle(confirmed_message(course_id, student_id, "pay-2")).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM course_purchases WHERE student_id = ?;")
            .bind(student_id.to_string())
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);

        let first = transport.poll("purchase-created", "g").await.unwrap().unwrap();
        transport.commit("g", &first).await.unwrap();
        assert!(transport.poll("purchase-created", "g").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_course_is_poison() {
        let (worker, _transport, _pool) = harness().await;
        let err = worker
            .handle(confirmed_message(Uuid::new_v4(), Uuid::new_v4(), "pay-3"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Poison(_)));
    }

    #[tokio::test]
    async fn invalid_tier_is_poison() {
        let (worker, _transport, pool) = harness().await;
        let course_id: String = sqlx::query_scalar("SELECT course_id FROM course_levels LIMIT 1;")
            .fetch_one(&pool)
            .await
            .unwrap();
        let course_id = Uuid::parse_str(&course_id).unwrap();

        let mut msg = confirmed_message(course_id, Uuid::new_v4(), "pay-4");
        msg.payload["metadata"]["purchaseTier"] = serde_json::json!(15);

        let err = worker.handle(msg).await.unwrap_err();
        assert!(matches!(err, AppError::Poison(_)));
    }
}
