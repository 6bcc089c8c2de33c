use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::{Allocation, Session, SessionStatus};
use crate::error::AppError;
use crate::events::{EventType, TrainerAllocated};
use crate::idempotency::{IdempotencyStore, IdempotentEmitter};
use crate::metrics::Counters;
use crate::repository::{AllocationRepository, PurchaseRepository, SessionRepository};
use crate::schedule::generate_plan;
use crate::transport::InboundMessage;

/// Consumes `TRAINER_ALLOCATED`, materialises the rolling session window,
/// emits `SESSIONS_GENERATED`; also drives the periodic top-up sweep (§4.8).
pub struct SessionWorker {
    sessions: Arc<dyn SessionRepository>,
    allocations: Arc<dyn AllocationRepository>,
    purchases: Arc<dyn PurchaseRepository>,
    idempotency: Arc<dyn IdempotencyStore>,
    emitter: Arc<IdempotentEmitter>,
    rolling_window_size: u32,
    top_up_threshold: u32,
    default_time_slot: String,
    metrics: Arc<Counters>,
}

impl SessionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        allocations: Arc<dyn AllocationRepository>,
        purchases: Arc<dyn PurchaseRepository>,
        idempotency: Arc<dyn IdempotencyStore>,
        emitter: Arc<IdempotentEmitter>,
        rolling_window_size: u32,
        top_up_threshold: u32,
        default_time_slot: String,
        metrics: Arc<Counters>,
    ) -> Self {
        Self {
            sessions,
            allocations,
            purchases,
            idempotency,
            emitter,
            rolling_window_size,
            top_up_threshold,
            default_time_slot,
            metrics,
        }
    }

    pub async fn handle(&self, msg: InboundMessage) -> Result<(), AppError> {
        let event: TrainerAllocated = serde_json::from_value(msg.payload.clone())
            .map_err(|e| AppError::Poison(format!("malformed TRAINER_ALLOCATED payload: {e}")))?;
        let correlation_id = msg.key.clone();

        if self
            .idempotency
            .lookup(&correlation_id, EventType::TrainerAllocated.consumed_marker())
            .await
            .map_err(AppError::transient)?
            .is_some()
        {
            return Ok(());
        }

        // WAITLISTED allocations carry trainerId=null; there is nothing to
        // schedule until a later (re-)assignment actually assigns a trainer.
        let Some(trainer_id) = event.trainer_id else {
            self.mark_processed(&correlation_id, &msg).await?;
            return Ok(());
        };

        let allocation = self
            .allocations
            .find_by_id(event.allocation_id)
            .await
            .map_err(AppError::transient)?
            .ok_or_else(|| AppError::Poison(format!("allocation {} not found", event.allocation_id)))?;

        let created = self.materialise(&allocation, trainer_id, event.student_id, event.course_id).await?;

        self.mark_processed(&correlation_id, &msg).await?;

        if !created.is_empty() {
            self.metrics
                .sessions_generated
                .fetch_add(created.len() as u64, std::sync::atomic::Ordering::Relaxed);
            let body = json!({
                "allocationId": allocation.allocation_id,
                "trainerId": trainer_id,
                "studentId": event.student_id,
                "courseId": event.course_id,
                "sessionCount": created.len(),
                "sessionIds": created,
                "startDate": allocation.metadata.start_date.date_naive().to_string(),
            });
            // Re-keyed on the new entity (allocationId) rather than relying
            // on the inbound correlation id matching it implicitly (§6:
            // `sessions-generated` partitions on allocationId).
            self.emitter
                .emit(EventType::SessionsGenerated, &allocation.allocation_id.to_string(), &body)
                .await
                .map_err(AppError::best_effort)?;
        }

        Ok(())
    }

    async fn mark_processed(&self, correlation_id: &str, msg: &InboundMessage) -> Result<(), AppError> {
        self.idempotency
            .mark(
                Uuid::new_v4(),
                correlation_id,
                EventType::TrainerAllocated.consumed_marker(),
                &msg.payload,
                "session-worker",
                "1.0.0",
            )
            .await
            .map_err(AppError::transient)?;
        Ok(())
    }

    /// Tops up the rolling window for one allocation; `skip` (total rows
    /// ever created) rather than `count_future` anchors the schedule so a
    /// gap left by completed sessions doesn't shift numbering or dates.
    async fn materialise(
        &self,
        allocation: &Allocation,
        trainer_id: Uuid,
        student_id: Uuid,
        course_id: Uuid,
    ) -> Result<Vec<Uuid>, AppError> {
        let today = crate::time::today();
        let future_count = self
            .sessions
            .count_future(allocation.allocation_id, today)
            .await
            .map_err(AppError::transient)?;
        let needed = self.rolling_window_size.saturating_sub(future_count);
        if needed == 0 {
            return Ok(Vec::new());
        }

        let purchase = self
            .purchases
            .find_by_id(allocation.purchase_id)
            .await
            .map_err(AppError::transient)?
            .ok_or_else(|| AppError::Poison(format!("purchase {} not found", allocation.purchase_id)))?;
        let total_sessions = purchase.purchase_tier.total_sessions();

        let skip = self
            .sessions
            .count_total(allocation.allocation_id)
            .await
            .map_err(AppError::transient)?;

        let time_slot = allocation
            .metadata
            .preferred_time_slot
            .clone()
            .unwrap_or_else(|| self.default_time_slot.clone());

        let plan = generate_plan(
            allocation.metadata.class_type,
            allocation.metadata.delivery_mode,
            allocation.metadata.start_date.date_naive(),
            total_sessions,
            skip,
            needed.min(total_sessions.saturating_sub(skip)),
            &time_slot,
        )?;

        let planned_sessions: Vec<Session> = plan
            .into_iter()
            .map(|p| Session {
                session_id: Uuid::new_v4(),
                allocation_id: allocation.allocation_id,
                student_id,
                trainer_id,
                scheduled_date: p.scheduled_date,
                scheduled_time: p.scheduled_time,
                status: SessionStatus::Scheduled,
                session_type: p.session_type,
                session_number: p.session_number,
                metadata: p.metadata,
            })
            .collect();

        if planned_sessions.is_empty() {
            return Ok(Vec::new());
        }

        self.sessions
            .insert_sessions(&planned_sessions)
            .await
            .map_err(AppError::transient)
    }

    /// Periodic sweep (§4.8): every interval, for each `{APPROVED, ACTIVE}`
    /// allocation, top up the window if it has dropped below threshold.
    /// Per-allocation failures are isolated so one bad allocation can't stall
    /// the sweep.
    pub async fn top_up_sweep(&self) {
        self.metrics.topup_sweeps.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let allocations = match self.allocations.list_for_topup().await {
            Ok(a) => a,
            Err(e) => {
                tracing::error!(error = %e, "top-up sweep failed to list allocations");
                return;
            }
        };

        for allocation in allocations {
            let Some(trainer_id) = allocation.trainer_id else {
                continue;
            };

            let today = crate::time::today();
            let future_count = match self.sessions.count_future(allocation.allocation_id, today).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::error!(allocation_id = %allocation.allocation_id, error = %e, "top-up count_future failed");
                    continue;
                }
            };

            if future_count >= self.top_up_threshold {
                self.metrics.topup_allocations_skipped.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                continue;
            }

            if let Err(e) = self
                .materialise(&allocation, trainer_id, allocation.student_id, allocation.course_id)
                .await
            {
                tracing::error!(allocation_id = %allocation.allocation_id, error = %e, "top-up materialise failed");
            }
        }
    }

    /// Runs `top_up_sweep` once immediately (startup sweep) and then every
    /// `interval` until `shutdown` fires.
    pub async fn run_topup_loop(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        self.top_up_sweep().await;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    if *shutdown.borrow() { return; }
                }
                _ = tokio::time::sleep(interval) => {
                    self.top_up_sweep().await;
                }
            }
            if *shutdown.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::allocation::{AllocationMetadata, ClassType, DeliveryMode};
    use crate::domain::{AllocationStatus, PurchaseTier};
    use crate::idempotency::SqlxIdempotencyStore;
    use crate::metrics::Counters;
    use crate::repository::{SqlxAllocationRepository, SqlxPurchaseRepository, SqlxSessionRepository};
    use crate::transport::inmemory::InMemoryTransport;
    use chrono::NaiveDate;
    use sqlx::any::AnyPoolOptions;

    async fn test_pool() -> sqlx::AnyPool {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::db::schema::migrate(&pool).await.unwrap();
        pool
    }

    async fn seed_purchase(pool: &sqlx::AnyPool, purchase_id: Uuid, student_id: Uuid, course_id: Uuid) {
        sqlx::query(
            r#"INSERT INTO course_purchases (id, student_id, course_id, purchase_tier, is_active, created_at, expiry_date, metadata)
               VALUES (?, ?, ?, 30, TRUE, 0, NULL, '{}');"#,
        )
        .bind(purchase_id.to_string())
        .bind(student_id.to_string())
        .bind(course_id.to_string())
        .execute(pool)
        .await
        .unwrap();
    }

    fn sample_allocation(allocation_id: Uuid, purchase_id: Uuid, student_id: Uuid, course_id: Uuid, trainer_id: Uuid) -> Allocation {
        Allocation {
            allocation_id,
            student_id,
            trainer_id: Some(trainer_id),
            course_id,
            purchase_id,
            status: AllocationStatus::Approved,
            created_at: chrono::Utc::now(),
            metadata: AllocationMetadata {
                preferred_time_slot: Some("16:00".to_string()),
                delivery_mode: DeliveryMode::WeekdayDaily,
                class_type: ClassType::OneOnOne,
                start_date: chrono::DateTime::from_naive_utc_and_offset(
                    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap().and_hms_opt(0, 0, 0).unwrap(),
                    chrono::Utc,
                ),
            },
        }
    }

    fn allocated_message(allocation_id: Uuid, trainer_id: Uuid, student_id: Uuid, course_id: Uuid, key: &str) -> InboundMessage {
        let payload = serde_json::json!({
            "allocationId": allocation_id,
            "trainerId": trainer_id,
            "studentId": student_id,
            "courseId": course_id,
            "sessionCount": 0,
            "startDate": "2024-06-03",
            "endDate": "2024-07-03",
        });
        InboundMessage {
            topic: "trainer-allocated".to_string(),
            partition: 0,
            offset: 0,
            key: key.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn event_driven_path_materialises_seven_future_sessions() {
        let pool = test_pool().await;
        let allocation_id = Uuid::new_v4();
        let purchase_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        let trainer_id = Uuid::new_v4();

        seed_purchase(&pool, purchase_id, student_id, course_id).await;
        let allocations: Arc<dyn AllocationRepository> = Arc::new(SqlxAllocationRepository::new(pool.clone()));
        allocations
            .try_commit(&sample_allocation(allocation_id, purchase_id, student_id, course_id, trainer_id), None)
            .await
            .unwrap();

        let sessions: Arc<dyn SessionRepository> = Arc::new(SqlxSessionRepository::new(pool.clone()));
        let purchases: Arc<dyn PurchaseRepository> = Arc::new(SqlxPurchaseRepository::new(pool.clone()));
        let idempotency: Arc<dyn IdempotencyStore> = Arc::new(SqlxIdempotencyStore::new(pool.clone()));
        let transport = InMemoryTransport::shared(3);
        let emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "session-worker"));
        let worker = SessionWorker::new(sessions.clone(), allocations, purchases, idempotency, emitter, 7, 3, "16:00".to_string(), Arc::new(Counters::default()));

        worker
            .handle(allocated_message(allocation_id, trainer_id, student_id, course_id, "corr-1"))
            .await
            .unwrap();

        let today = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert_eq!(sessions.count_future(allocation_id, today).await.unwrap(), 7);

        let msg = transport.poll("sessions-generated", "g").await.unwrap().unwrap();
        assert_eq!(msg.payload["sessionCount"], 7);
    }

    #[tokio::test]
    async fn waitlisted_event_is_a_no_op() {
        let pool = test_pool().await;
        let sessions: Arc<dyn SessionRepository> = Arc::new(SqlxSessionRepository::new(pool.clone()));
        let allocations: Arc<dyn AllocationRepository> = Arc::new(SqlxAllocationRepository::new(pool.clone()));
        let purchases: Arc<dyn PurchaseRepository> = Arc::new(SqlxPurchaseRepository::new(pool.clone()));
        let idempotency: Arc<dyn IdempotencyStore> = Arc::new(SqlxIdempotencyStore::new(pool.clone()));
        let transport = InMemoryTransport::shared(3);
        let emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "session-worker"));
        let worker = SessionWorker::new(sessions, allocations, purchases, idempotency, emitter, 7, 3, "16:00".to_string(), Arc::new(Counters::default()));

        let payload = serde_json::json!({
            "allocationId": Uuid::new_v4(),
            "trainerId": null,
            "studentId": Uuid::new_v4(),
            "courseId": Uuid::new_v4(),
            "sessionCount": 0,
            "startDate": "2024-06-03",
            "endDate": "2024-07-03",
        });
        let msg = InboundMessage {
            topic: "trainer-allocated".to_string(),
            partition: 0,
            offset: 0,
            key: "corr-waitlisted".to_string(),
            payload,
        };

        worker.handle(msg).await.unwrap();
        assert!(transport.poll("sessions-generated", "g").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn topup_sweep_tops_up_allocations_below_threshold() {
        let pool = test_pool().await;
        let allocation_id = Uuid::new_v4();
        let purchase_id = Uuid::new_v4();
        let student_id = Uuid::new_v4();
        let course_id = Uuid::new_v4();
        let trainer_id = Uuid::new_v4();

        seed_purchase(&pool, purchase_id, student_id, course_id).await;
        let allocations: Arc<dyn AllocationRepository> = Arc::new(SqlxAllocationRepository::new(pool.clone()));
        allocations
            .try_commit(&sample_allocation(allocation_id, purchase_id, student_id, course_id, trainer_id), None)
            .await
            .unwrap();

        let sessions: Arc<dyn SessionRepository> = Arc::new(SqlxSessionRepository::new(pool.clone()));
        // Seed 2 future sessions directly, below the threshold of 3.
        sessions
            .insert_sessions(&[
                Session {
                    session_id: Uuid::new_v4(),
                    allocation_id,
                    student_id,
                    trainer_id,
                    scheduled_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                    scheduled_time: "16:00".to_string(),
                    status: SessionStatus::Scheduled,
                    session_type: crate::domain::SessionType::Online,
                    session_number: 1,
                    metadata: serde_json::json!({}),
                },
                Session {
                    session_id: Uuid::new_v4(),
                    allocation_id,
                    student_id,
                    trainer_id,
                    scheduled_date: NaiveDate::from_ymd_opt(2024, 6, 4).unwrap(),
                    scheduled_time: "16:00".to_string(),
                    status: SessionStatus::Scheduled,
                    session_type: crate::domain::SessionType::Online,
                    session_number: 2,
                    metadata: serde_json::json!({}),
                },
            ])
            .await
            .unwrap();

        let purchases: Arc<dyn PurchaseRepository> = Arc::new(SqlxPurchaseRepository::new(pool.clone()));
        let idempotency: Arc<dyn IdempotencyStore> = Arc::new(SqlxIdempotencyStore::new(pool.clone()));
        let transport = InMemoryTransport::shared(3);
        let emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "session-worker"));
        let worker = SessionWorker::new(sessions.clone(), allocations, purchases, idempotency, emitter, 7, 3, "16:00".to_string(), Arc::new(Counters::default()));

        worker.top_up_sweep().await;

        let total = sessions.count_total(allocation_id).await.unwrap();
        assert_eq!(total, 7);
    }
}
