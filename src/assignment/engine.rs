use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::domain::allocation::AllocationMetadata;
use crate::domain::{Allocation, AllocationStatus, TrainerCandidate};
use crate::error::AppError;
use crate::repository::{AllocationRepository, ScheduleSlotRepository, ZoneRepository};
use crate::retry::execute_with_retry;
use crate::trainer_directory::{DirectoryFilters, TrainerDirectory};

use super::zone::{haversine_km, lookup_zone};

/// Per-trainer allocation cap derived from their average rating (§4.6 step 4).
pub fn cap_for_rating(rating: f64) -> u32 {
    if rating >= 4.6 {
        8
    } else if rating >= 4.1 {
        7
    } else if rating >= 3.6 {
        6
    } else if rating >= 3.1 {
        5
    } else if rating >= 2.1 {
        4
    } else {
        3
    }
}

/// Everything the engine needs to rank candidates and, on success, commit
/// the allocation row itself (§4.6 step 6).
#[derive(Clone, Debug)]
pub struct AssignmentRequest {
    pub purchase_id: Uuid,
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub franchise_id: Option<Uuid>,
    pub city_id: Option<Uuid>,
    pub student_lat: f64,
    pub student_lng: f64,
    pub preferred_time_slot: Option<String>,
    pub start_date: NaiveDate,
    pub metadata: AllocationMetadata,
}

#[derive(Clone, Debug)]
pub enum AssignmentOutcome {
    /// The allocation row has already been written by the engine.
    Assigned { allocation_id: Uuid, trainer_id: Uuid },
    /// Nothing was written; the caller must insert the WAITLISTED row.
    Waitlisted { reason: String },
}

/// Stateless eligibility → ranking → cap → assignment algorithm (C10).
pub struct AutoAssignmentEngine {
    directory: Arc<dyn TrainerDirectory>,
    allocations: Arc<dyn AllocationRepository>,
    schedule_slots: Arc<dyn ScheduleSlotRepository>,
    zones: Arc<dyn ZoneRepository>,
    directory_retry: RetryPolicy,
}

impl AutoAssignmentEngine {
    pub fn new(
        directory: Arc<dyn TrainerDirectory>,
        allocations: Arc<dyn AllocationRepository>,
        schedule_slots: Arc<dyn ScheduleSlotRepository>,
        zones: Arc<dyn ZoneRepository>,
        directory_retry: RetryPolicy,
    ) -> Self {
        Self {
            directory,
            allocations,
            schedule_slots,
            zones,
            directory_retry,
        }
    }

    pub async fn assign(&self, req: &AssignmentRequest) -> Result<AssignmentOutcome, AppError> {
        let filters = DirectoryFilters {
            course_id: req.course_id,
            franchise_id: req.franchise_id,
        };

        // Step 1: fetch candidates, retrying up to 3x; total failure waitlists.
        let fetch = execute_with_retry(&self.directory_retry, |_attempt| {
            let directory = self.directory.clone();
            let filters = filters.clone();
            async move { directory.fetch_candidates(&filters).await }
        })
        .await;

        let trainers = match fetch {
            Ok(t) if !t.is_empty() => t,
            Ok(_) => {
                return Ok(AssignmentOutcome::Waitlisted {
                    reason: "trainer directory returned no candidates".to_string(),
                });
            }
            Err(_) => {
                return Ok(AssignmentOutcome::Waitlisted {
                    reason: "trainer directory unavailable after retries".to_string(),
                });
            }
        };

        // Zone lookup bounds the service radius used by step 3.
        let clusters = self.zones.active_clusters(req.city_id).await.map_err(AppError::transient)?;
        let zone_matches = lookup_zone(&clusters, req.student_lat, req.student_lng);
        let Some((zone, _)) = zone_matches.into_iter().next() else {
            return Ok(AssignmentOutcome::Waitlisted {
                reason: "SERVICE_NOT_AVAILABLE: no active zone covers the student's location".to_string(),
            });
        };

        let time_slot = req.preferred_time_slot.clone().unwrap_or_default();

        // Step 2 (hard filters) + step 3 (distance cap).
        let mut candidates: Vec<TrainerCandidate> = Vec::new();
        for t in &trainers {
            if !t.active {
                continue;
            }
            if !t.certified_course_ids.contains(&req.course_id) {
                continue;
            }
            if !time_slot.is_empty() {
                let conflict = self
                    .schedule_slots
                    .has_conflict(t.trainer_id, req.start_date, &time_slot)
                    .await
                    .map_err(AppError::transient)?;
                if conflict {
                    continue;
                }
            }
            let distance_km = haversine_km(t.home_lat, t.home_lng, req.student_lat, req.student_lng);
            if distance_km > zone.radius_km {
                continue;
            }

            // Step 4: load cap.
            let current_load = self
                .allocations
                .count_active_for_trainer(t.trainer_id)
                .await
                .map_err(AppError::transient)?;
            let cap = if t.accept_more_allocations {
                cap_for_rating(t.rating)
            } else {
                current_load
            };
            if current_load >= cap {
                continue;
            }

            candidates.push(TrainerCandidate {
                trainer_id: t.trainer_id,
                distance_km,
                rating: t.rating,
                current_load,
            });
        }

        if candidates.is_empty() {
            return Ok(AssignmentOutcome::Waitlisted {
                reason: "no trainer passed eligibility, distance, or load filters".to_string(),
            });
        }

        // Step 5: rank — distance asc, load asc, rating desc, trainer id tiebreak.
        candidates.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.current_load.cmp(&b.current_load))
                .then(b.rating.partial_cmp(&a.rating).unwrap_or(std::cmp::Ordering::Equal))
                .then(a.trainer_id.cmp(&b.trainer_id))
        });

        // Step 6: commit, re-verifying the load cap under the repository's
        // own transaction; fall through to the next candidate on conflict.
        let allocation_id = Uuid::new_v4();
        let created_at: DateTime<Utc> = Utc::now();
        for candidate in &candidates {
            let cap = cap_for_rating(candidate.rating);
            let allocation = Allocation {
                allocation_id,
                student_id: req.student_id,
                trainer_id: Some(candidate.trainer_id),
                course_id: req.course_id,
                purchase_id: req.purchase_id,
                status: AllocationStatus::Approved,
                created_at,
                metadata: req.metadata.clone(),
            };

            let committed = self
                .allocations
                .try_commit(&allocation, Some(cap))
                .await
                .map_err(AppError::transient)?;

            if committed {
                return Ok(AssignmentOutcome::Assigned {
                    allocation_id,
                    trainer_id: candidate.trainer_id,
                });
            }
        }

        Ok(AssignmentOutcome::Waitlisted {
            reason: "all ranked candidates lost the capacity race".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::domain::Trainer;
    use crate::domain::ServiceCluster;
    use crate::repository::allocation::AllocationRepository as _;
    use crate::trainer_directory::inmemory::InMemoryTrainerDirectory;

    struct FakeAllocationRepo {
        loads: parking_lot::Mutex<std::collections::HashMap<Uuid, u32>>,
        committed: parking_lot::Mutex<Vec<Allocation>>,
    }

    #[async_trait::async_trait]
    impl AllocationRepository for FakeAllocationRepo {
        async fn find_non_terminal(&self, _student_id: Uuid, _course_id: Uuid) -> anyhow::Result<Option<Allocation>> {
            Ok(None)
        }

        async fn count_active_for_trainer(&self, trainer_id: Uuid) -> anyhow::Result<u32> {
            Ok(*self.loads.lock().get(&trainer_id).unwrap_or(&0))
        }

        async fn try_commit(&self, allocation: &Allocation, cap: Option<u32>) -> anyhow::Result<bool> {
            if let (Some(trainer_id), Some(cap)) = (allocation.trainer_id, cap) {
                let mut loads = self.loads.lock();
                let current = *loads.get(&trainer_id).unwrap_or(&0);
                if current >= cap {
                    return Ok(false);
                }
                loads.insert(trainer_id, current + 1);
            }
            self.committed.lock().push(allocation.clone());
            Ok(true)
        }

        async fn list_for_topup(&self) -> anyhow::Result<Vec<Allocation>> {
            Ok(self.committed.lock().clone())
        }

        async fn find_by_id(&self, allocation_id: Uuid) -> anyhow::Result<Option<Allocation>> {
            Ok(self.committed.lock().iter().find(|a| a.allocation_id == allocation_id).cloned())
        }

        async fn find_by_purchase_id(&self, purchase_id: Uuid) -> anyhow::Result<Option<Allocation>> {
            Ok(self.committed.lock().iter().find(|a| a.purchase_id == purchase_id).cloned())
        }
    }

    struct FakeScheduleSlots;

    #[async_trait::async_trait]
    impl ScheduleSlotRepository for FakeScheduleSlots {
        async fn has_conflict(&self, _trainer_id: Uuid, _date: NaiveDate, _time_slot: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
        async fn reserve(&self, _trainer_id: Uuid, _date: NaiveDate, _time_slot: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct FakeZones(Vec<ServiceCluster>);

    #[async_trait::async_trait]
    impl ZoneRepository for FakeZones {
        async fn active_clusters(&self, _city_id: Option<Uuid>) -> anyhow::Result<Vec<ServiceCluster>> {
            Ok(self.0.clone())
        }
    }

    fn trainer(id: Uuid, course_id: Uuid, lat: f64, lng: f64, rating: f64) -> Trainer {
        Trainer {
            trainer_id: id,
            active: true,
            certified_course_ids: vec![course_id],
            franchise_id: Uuid::new_v4(),
            home_lat: lat,
            home_lng: lng,
            rating,
            accept_more_allocations: true,
        }
    }

    fn zone(lat: f64, lng: f64, radius_km: f64) -> ServiceCluster {
        ServiceCluster {
            cluster_id: Uuid::new_v4(),
            city_id: Uuid::new_v4(),
            centre_lat: lat,
            centre_lng: lng,
            radius_km,
            active: true,
        }
    }

    fn retry_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            multiplier: 1.0,
            max_delay: Duration::from_millis(2),
        }
    }

    fn base_request(course_id: Uuid) -> AssignmentRequest {
        AssignmentRequest {
            purchase_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            course_id,
            franchise_id: None,
            city_id: None,
            student_lat: 12.9716,
            student_lng: 77.5946,
            preferred_time_slot: Some("16:00".to_string()),
            start_date: NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
            metadata: AllocationMetadata {
                preferred_time_slot: Some("16:00".to_string()),
                delivery_mode: crate::domain::DeliveryMode::WeekdayDaily,
                class_type: crate::domain::ClassType::OneOnOne,
                start_date: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn assigns_the_nearest_eligible_trainer() {
        let course_id = Uuid::new_v4();
        let near = Uuid::new_v4();
        let far = Uuid::new_v4();
        let directory = Arc::new(InMemoryTrainerDirectory::new(vec![
            trainer(far, course_id, 13.5, 78.2, 4.9),
            trainer(near, course_id, 12.98, 77.60, 4.9),
        ]));

        let engine = AutoAssignmentEngine::new(
            directory,
            Arc::new(FakeAllocationRepo {
                loads: Default::default(),
                committed: Default::default(),
            }),
            Arc::new(FakeScheduleSlots),
            Arc::new(FakeZones(vec![zone(12.9716, 77.5946, 50.0)])),
            retry_policy(),
        );

        let outcome = engine.assign(&base_request(course_id)).await.unwrap();
        match outcome {
            AssignmentOutcome::Assigned { trainer_id, .. } => assert_eq!(trainer_id, near),
            other => panic!("expected Assigned, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_directory_response_waitlists() {
        let course_id = Uuid::new_v4();
        let directory = Arc::new(InMemoryTrainerDirectory::new(vec![]));
        let engine = AutoAssignmentEngine::new(
            directory,
            Arc::new(FakeAllocationRepo {
                loads: Default::default(),
                committed: Default::default(),
            }),
            Arc::new(FakeScheduleSlots),
            Arc::new(FakeZones(vec![zone(12.9716, 77.5946, 50.0)])),
            retry_policy(),
        );

        let outcome = engine.assign(&base_request(course_id)).await.unwrap();
        assert!(matches!(outcome, AssignmentOutcome::Waitlisted { .. }));
    }

    #[tokio::test]
    async fn directory_failure_after_retries_waitlists() {
        let course_id = Uuid::new_v4();
        let directory = Arc::new(InMemoryTrainerDirectory::new(vec![trainer(
            Uuid::new_v4(),
            course_id,
            12.98,
            77.60,
            4.9,
        )]));
        directory.set_always_fail(true);

        let engine = AutoAssignmentEngine::new(
            directory,
            Arc::new(FakeAllocationRepo {
                loads: Default::default(),
                committed: Default::default(),
            }),
            Arc::new(FakeScheduleSlots),
            Arc::new(FakeZones(vec![zone(12.9716, 77.5946, 50.0)])),
            retry_policy(),
        );

        let outcome = engine.assign(&base_request(course_id)).await.unwrap();
        assert!(matches!(outcome, AssignmentOutcome::Waitlisted { .. }));
    }

    #[tokio::test]
    async fn no_covering_zone_waitlists() {
        let course_id = Uuid::new_v4();
        let directory = Arc::new(InMemoryTrainerDirectory::new(vec![trainer(
            Uuid::new_v4(),
            course_id,
            12.98,
            77.60,
            4.9,
        )]));

        let engine = AutoAssignmentEngine::new(
            directory,
            Arc::new(FakeAllocationRepo {
                loads: Default::default(),
                committed: Default::default(),
            }),
            Arc::new(FakeScheduleSlots),
            Arc::new(FakeZones(vec![])),
            retry_policy(),
        );

        let outcome = engine.assign(&base_request(course_id)).await.unwrap();
        assert!(matches!(outcome, AssignmentOutcome::Waitlisted { .. }));
    }

    #[tokio::test]
    async fn trainer_at_cap_is_skipped_for_the_next_candidate() {
        let course_id = Uuid::new_v4();
        let capped = Uuid::new_v4();
        let open = Uuid::new_v4();
        let directory = Arc::new(InMemoryTrainerDirectory::new(vec![
            trainer(capped, course_id, 12.971, 77.595, 4.9),
            trainer(open, course_id, 12.98, 77.60, 3.0),
        ]));

        let mut loads = std::collections::HashMap::new();
        loads.insert(capped, cap_for_rating(4.9));
        let repo = Arc::new(FakeAllocationRepo {
            loads: parking_lot::Mutex::new(loads),
            committed: Default::default(),
        });

        let engine = AutoAssignmentEngine::new(
            directory,
            repo,
            Arc::new(FakeScheduleSlots),
            Arc::new(FakeZones(vec![zone(12.9716, 77.5946, 50.0)])),
            retry_policy(),
        );

        let outcome = engine.assign(&base_request(course_id)).await.unwrap();
        match outcome {
            AssignmentOutcome::Assigned { trainer_id, .. } => assert_eq!(trainer_id, open),
            other => panic!("expected Assigned to the non-capped trainer, got {other:?}"),
        }
    }
}
