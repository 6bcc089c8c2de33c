use std::sync::Arc;

use crate::cache::{student_home_key, student_learning_key, CacheClient};
use crate::error::AppError;
use crate::events::extract_student_id;
use crate::metrics::Counters;
use crate::transport::InboundMessage;

/// Invalidates the student `home`/`learning` read-model cache on any of
/// `purchase-created`, `trainer-allocated`, `sessions-generated` (§4.9).
///
/// One handler is shared across all three topics: the event body differs but
/// the side effect is identical, so there's nothing to gain from branching on
/// `payload["type"]` beyond locating `studentId`. `del` is naturally
/// idempotent, so unlike the other workers this one has no idempotency
/// ledger entry of its own — a replay just deletes an already-absent key.
pub struct CacheWorker {
    cache: Arc<dyn CacheClient>,
    metrics: Arc<Counters>,
}

impl CacheWorker {
    pub fn new(cache: Arc<dyn CacheClient>, metrics: Arc<Counters>) -> Self {
        Self { cache, metrics }
    }

    pub async fn handle(&self, msg: InboundMessage) -> Result<(), AppError> {
        let student_id = extract_student_id(&msg.payload).ok_or_else(|| {
            AppError::Poison(format!("{} event carries no studentId", msg.topic))
        })?;
        let student_id = student_id.to_string();

        let result = async {
            self.cache.del(&student_home_key(&student_id)).await?;
            self.cache.del(&student_learning_key(&student_id)).await?;
            Ok(())
        }
        .await;

        match &result {
            Ok(()) => {
                self.metrics.cache_invalidations.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Err(_) => {
                self.metrics.cache_invalidation_failures.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
        }

        result.map_err(AppError::best_effort)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::inmemory::InMemoryCache;
    use crate::metrics::Counters;
    use crate::transport::InboundMessage;
    use std::time::Duration;
    use uuid::Uuid;

    fn event_message(topic: &str, student_id: Uuid) -> InboundMessage {
        InboundMessage {
            topic: topic.to_string(),
            partition: 0,
            offset: 0,
            key: "corr-1".to_string(),
            payload: serde_json::json!({
                "type": "TRAINER_ALLOCATED",
                "studentId": student_id,
                "allocationId": Uuid::new_v4(),
            }),
        }
    }

    #[tokio::test]
    async fn invalidates_both_student_keys() {
        let cache: Arc<dyn CacheClient> = Arc::new(InMemoryCache::new());
        let student_id = Uuid::new_v4();
        cache
            .set(&student_home_key(&student_id.to_string()), "stale", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .set(&student_learning_key(&student_id.to_string()), "stale", Duration::from_secs(60))
            .await
            .unwrap();

        let worker = CacheWorker::new(cache.clone(), Arc::new(Counters::default()));
        worker.handle(event_message("trainer-allocated", student_id)).await.unwrap();

        assert!(cache.get(&student_home_key(&student_id.to_string())).await.unwrap().is_none());
        assert!(cache.get(&student_learning_key(&student_id.to_string())).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_student_id_is_poison() {
        let cache: Arc<dyn CacheClient> = Arc::new(InMemoryCache::new());
        let worker = CacheWorker::new(cache, Arc::new(Counters::default()));
        let msg = InboundMessage {
            topic: "purchase-created".to_string(),
            partition: 0,
            offset: 0,
            key: "corr-2".to_string(),
            payload: serde_json::json!({"type": "PURCHASE_CREATED"}),
        };
        let err = worker.handle(msg).await.unwrap_err();
        assert!(matches!(err, AppError::Poison(_)));
    }

    #[tokio::test]
    async fn replaying_an_already_absent_key_is_a_no_op() {
        let cache: Arc<dyn CacheClient> = Arc::new(InMemoryCache::new());
        let student_id = Uuid::new_v4();
        let worker = CacheWorker::new(cache, Arc::new(Counters::default()));
        worker.handle(event_message("sessions-generated", student_id)).await.unwrap();
        worker.handle(event_message("sessions-generated", student_id)).await.unwrap();
    }
}
