use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::assignment::{AssignmentOutcome, AssignmentRequest, AutoAssignmentEngine};
use crate::domain::allocation::{AllocationMetadata, ClassType, DeliveryMode};
use crate::domain::{Allocation, AllocationStatus};
use crate::error::AppError;
use crate::events::{EventType, PurchaseCreated};
use crate::idempotency::{IdempotencyStore, IdempotentEmitter};
use crate::metrics::Counters;
use crate::repository::{AllocationRepository, ZoneRepository};
use crate::transport::InboundMessage;

/// Consumes `PURCHASE_CREATED`, resolves a zone + candidate trainer via the
/// assignment engine, writes the allocation row, emits `TRAINER_ALLOCATED`
/// (§4.5).
pub struct AllocationWorker {
    engine: Arc<AutoAssignmentEngine>,
    allocations: Arc<dyn AllocationRepository>,
    zones: Arc<dyn ZoneRepository>,
    idempotency: Arc<dyn IdempotencyStore>,
    emitter: Arc<IdempotentEmitter>,
    metrics: Arc<Counters>,
}

impl AllocationWorker {
    pub fn new(
        engine: Arc<AutoAssignmentEngine>,
        allocations: Arc<dyn AllocationRepository>,
        zones: Arc<dyn ZoneRepository>,
        idempotency: Arc<dyn IdempotencyStore>,
        emitter: Arc<IdempotentEmitter>,
        metrics: Arc<Counters>,
    ) -> Self {
        Self {
            engine,
            allocations,
            zones,
            idempotency,
            emitter,
            metrics,
        }
    }

    pub async fn handle(&self, msg: InboundMessage) -> Result<(), AppError> {
        let event: PurchaseCreated = serde_json::from_value(msg.payload.clone())
            .map_err(|e| AppError::Poison(format!("malformed PURCHASE_CREATED payload: {e}")))?;
        let correlation_id = msg.key.clone();

        let already_processed = self
            .idempotency
            .lookup(&correlation_id, EventType::PurchaseCreated.consumed_marker())
            .await
            .map_err(AppError::transient)?
            .is_some();

        let allocation = if already_processed {
            // Resolve by purchase_id, not find_non_terminal — a prior attempt
            // may have committed a WAITLISTED row (excluded from NON_TERMINAL)
            // and crashed before the emit below ran.
            self.allocations
                .find_by_purchase_id(event.purchase_id)
                .await
                .map_err(AppError::transient)?
                .ok_or_else(|| {
                    AppError::Poison(format!(
                        "PURCHASE_CREATED {correlation_id} marked processed but no allocation found"
                    ))
                })?
        } else {
            let student_lat = event.metadata.get("lat").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let student_lng = event.metadata.get("lng").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let city_id = event
                .metadata
                .get("cityId")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());
            let franchise_id = event
                .metadata
                .get("franchiseId")
                .and_then(|v| v.as_str())
                .and_then(|s| Uuid::parse_str(s).ok());
            let preferred_time_slot = event.metadata.get("timeSlot").and_then(|v| v.as_str()).map(String::from);
            let start_date = event
                .metadata
                .get("startDate")
                .and_then(|v| v.as_str())
                .and_then(|s| chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
                .unwrap_or_else(crate::time::today);
            let delivery_mode = match event.metadata.get("deliveryMode").and_then(|v| v.as_str()) {
                Some("SUNDAY_ONLY") => DeliveryMode::SundayOnly,
                _ => DeliveryMode::WeekdayDaily,
            };
            let class_type = match event.metadata.get("classType").and_then(|v| v.as_str()) {
                Some("HYBRID") => ClassType::Hybrid,
                _ => ClassType::OneOnOne,
            };

            // franchise_id, if absent from metadata, is resolved from the
            // zone covering the student so the directory filter still narrows
            // by franchise where the zone implies one.
            let franchise_id = match franchise_id {
                Some(f) => Some(f),
                None => {
                    let clusters = self.zones.active_clusters(city_id).await.map_err(AppError::transient)?;
                    crate::assignment::lookup_zone(&clusters, student_lat, student_lng)
                        .into_iter()
                        .next()
                        .map(|(cluster, _)| cluster.cluster_id)
                }
            };

            let request = AssignmentRequest {
                purchase_id: event.purchase_id,
                student_id: event.student_id,
                course_id: event.course_id,
                franchise_id,
                city_id,
                student_lat,
                student_lng,
                preferred_time_slot: preferred_time_slot.clone(),
                start_date,
                metadata: AllocationMetadata {
                    preferred_time_slot: preferred_time_slot.clone(),
                    delivery_mode,
                    class_type,
                    start_date: chrono::DateTime::from_naive_utc_and_offset(
                        start_date.and_hms_opt(0, 0, 0).unwrap_or_default(),
                        chrono::Utc,
                    ),
                },
            };

            let outcome = self.engine.assign(&request).await?;

            let allocation = match outcome {
                AssignmentOutcome::Assigned { allocation_id, trainer_id } => {
                    self.metrics.allocations_assigned.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    Allocation {
                        allocation_id,
                        student_id: event.student_id,
                        trainer_id: Some(trainer_id),
                        course_id: event.course_id,
                        purchase_id: event.purchase_id,
                        status: AllocationStatus::Approved,
                        created_at: chrono::Utc::now(),
                        metadata: request.metadata.clone(),
                    }
                }
                AssignmentOutcome::Waitlisted { reason } => {
                    tracing::info!(correlation_id, reason, "allocation waitlisted");
                    self.metrics.allocations_waitlisted.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    let allocation = Allocation {
                        allocation_id: Uuid::new_v4(),
                        student_id: event.student_id,
                        trainer_id: None,
                        course_id: event.course_id,
                        purchase_id: event.purchase_id,
                        status: AllocationStatus::Waitlisted,
                        created_at: chrono::Utc::now(),
                        metadata: request.metadata.clone(),
                    };
                    self.allocations
                        .try_commit(&allocation, None)
                        .await
                        .map_err(AppError::transient)?;
                    allocation
                }
            };

            self.idempotency
                .mark(
                    Uuid::new_v4(),
                    &correlation_id,
                    EventType::PurchaseCreated.consumed_marker(),
                    &msg.payload,
                    "allocation-worker",
                    "1.0.0",
                )
                .await
                .map_err(AppError::transient)?;

            allocation
        };

        let start_date = allocation.metadata.start_date.date_naive();
        let end_date = start_date + chrono::Duration::days(30);
        let body = json!({
            "allocationId": allocation.allocation_id,
            "trainerId": allocation.trainer_id,
            "studentId": allocation.student_id,
            "courseId": allocation.course_id,
            "sessionCount": 0,
            "startDate": start_date.to_string(),
            "endDate": end_date.to_string(),
        });

        // Re-keyed on the new entity (allocationId), not the inbound
        // correlation id (§6: `trainer-allocated` partitions on allocationId).
        self.emitter
            .emit(EventType::TrainerAllocated, &allocation.allocation_id.to_string(), &body)
            .await
            .map_err(AppError::transient)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::engine::AutoAssignmentEngine as Engine;
    use crate::config::RetryPolicy;
    use crate::metrics::Counters;
    use crate::domain::Trainer;
    use crate::idempotency::SqlxIdempotencyStore;
    use crate::repository::{SqlxAllocationRepository, SqlxScheduleSlotRepository, SqlxZoneRepository};
    use crate::trainer_directory::inmemory::InMemoryTrainerDirectory;
    use crate::transport::inmemory::InMemoryTransport;
    use sqlx::any::AnyPoolOptions;
    use std::time::Duration;

    async fn test_pool() -> sqlx::AnyPool {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new().connect("sqlite::memory:").await.unwrap();
        crate::db::schema::migrate(&pool).await.unwrap();
        pool
    }

    fn retry_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(2),
        }
    }

    fn purchase_created_message(course_id: Uuid, student_id: Uuid, purchase_id: Uuid, key: &str) -> InboundMessage {
        let payload = serde_json::json!({
            "purchaseId": purchase_id,
            "studentId": student_id,
            "courseId": course_id,
            "purchaseTier": 30,
            "metadata": {
                "lat": 12.9716,
                "lng": 77.5946,
                "timeSlot": "16:00",
                "startDate": "2024-06-03",
                "deliveryMode": "WEEKDAY_DAILY",
                "classType": "ONE_ON_ONE",
            },
        });
        InboundMessage {
            topic: "purchase-created".to_string(),
            partition: 0,
            offset: 0,
            key: key.to_string(),
            payload,
        }
    }

    #[tokio::test]
    async fn assigns_and_emits_trainer_allocated() {
        let pool = test_pool().await;
        let course_id = Uuid::new_v4();
        let trainer_id = Uuid::new_v4();

        sqlx::query(
            r#"INSERT INTO service_clusters (id, city_id, centre_lat, centre_lng, radius_km, active)
               VALUES (?, ?, 12.9716, 77.5946, 50.0, TRUE);"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(Uuid::new_v4().to_string())
        .execute(&pool)
        .await
        .unwrap();

        let directory = Arc::new(InMemoryTrainerDirectory::new(vec![Trainer {
            trainer_id,
            active: true,
            certified_course_ids: vec![course_id],
            franchise_id: Uuid::new_v4(),
            home_lat: 12.98,
            home_lng: 77.60,
            rating: 4.9,
            accept_more_allocations: true,
        }]));

        let allocations: Arc<dyn AllocationRepository> = Arc::new(SqlxAllocationRepository::new(pool.clone()));
        let zones: Arc<dyn ZoneRepository> = Arc::new(SqlxZoneRepository::new(pool.clone()));
        let schedule_slots = Arc::new(SqlxScheduleSlotRepository::new(pool.clone()));
        let engine = Arc::new(Engine::new(directory, allocations.clone(), schedule_slots, zones.clone(), retry_policy()));

        let idempotency: Arc<dyn IdempotencyStore> = Arc::new(SqlxIdempotencyStore::new(pool.clone()));
        let transport = InMemoryTransport::shared(3);
        let emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "allocation-worker"));
        let worker = AllocationWorker::new(engine, allocations, zones, idempotency, emitter, Arc::new(Counters::default()));

        let student_id = Uuid::new_v4();
        worker
            .handle(purchase_created_message(course_id, student_id, Uuid::new_v4(), "purchase-1"))
            .await
            .unwrap();

        let msg = transport.poll("trainer-allocated", "g").await.unwrap().unwrap();
        assert_eq!(msg.payload["trainerId"], trainer_id.to_string());
    }

    #[tokio::test]
    async fn no_eligible_trainer_waitlists_and_still_emits() {
        let pool = test_pool().await;
        let course_id = Uuid::new_v4();

        let directory = Arc::new(InMemoryTrainerDirectory::new(vec![]));
        let allocations: Arc<dyn AllocationRepository> = Arc::new(SqlxAllocationRepository::new(pool.clone()));
        let zones: Arc<dyn ZoneRepository> = Arc::new(SqlxZoneRepository::new(pool.clone()));
        let schedule_slots = Arc::new(SqlxScheduleSlotRepository::new(pool.clone()));
        let engine = Arc::new(Engine::new(directory, allocations.clone(), schedule_slots, zones.clone(), retry_policy()));

        let idempotency: Arc<dyn IdempotencyStore> = Arc::new(SqlxIdempotencyStore::new(pool.clone()));
        let transport = InMemoryTransport::shared(3);
        let emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "allocation-worker"));
        let worker = AllocationWorker::new(engine, allocations, zones, idempotency, emitter, Arc::new(Counters::default()));

        worker
            .handle(purchase_created_message(course_id, Uuid::new_v4(), Uuid::new_v4(), "purchase-2"))
            .await
            .unwrap();

        let msg = transport.poll("trainer-allocated", "g").await.unwrap().unwrap();
        assert!(msg.payload["trainerId"].is_null());
    }
}
