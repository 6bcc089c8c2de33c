use std::sync::Arc;
use std::time::Duration;

use tutor_coordination_core::assignment::AutoAssignmentEngine;
use tutor_coordination_core::cache::redis_cache::RedisCache;
use tutor_coordination_core::cache::CacheClient;
use tutor_coordination_core::config::AppConfig;
use tutor_coordination_core::db::Db;
use tutor_coordination_core::dlq::DlqPublisher;
use tutor_coordination_core::idempotency::{IdempotentEmitter, SqlxIdempotencyStore};
use tutor_coordination_core::logger::init_tracing;
use tutor_coordination_core::metrics::Counters;
use tutor_coordination_core::refresh::RefreshTokenService;
use tutor_coordination_core::refresh_lock::RefreshLockCoordinator;
use tutor_coordination_core::repository::{
    SqlxAllocationRepository, SqlxPurchaseRepository, SqlxRefreshTokenRepository, SqlxScheduleSlotRepository,
    SqlxSessionRepository, SqlxZoneRepository,
};
use tutor_coordination_core::trainer_directory::http::HttpTrainerDirectory;
use tutor_coordination_core::trainer_directory::TrainerDirectory;
use tutor_coordination_core::transport::inmemory::InMemoryTransport;
use tutor_coordination_core::transport::EventLogTransport;
use tutor_coordination_core::workers::allocation::AllocationWorker;
use tutor_coordination_core::workers::cache::CacheWorker;
use tutor_coordination_core::workers::purchase::PurchaseWorker;
use tutor_coordination_core::workers::session::SessionWorker;
use tutor_coordination_core::workers::run_worker_loop;

#[cfg(feature = "kafka")]
use tutor_coordination_core::transport::kafka::KafkaTransport;

fn build_transport(cfg: &AppConfig) -> anyhow::Result<Arc<dyn EventLogTransport>> {
    #[cfg(feature = "kafka")]
    {
        let transport = KafkaTransport::connect(&cfg.kafka_bootstrap_servers, cfg.topic_partitions)?;
        return Ok(Arc::new(transport));
    }
    #[cfg(not(feature = "kafka"))]
    {
        Ok(InMemoryTransport::shared(cfg.topic_partitions))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    sqlx::any::install_default_drivers();

    let is_production = std::env::var("APP_ENV").unwrap_or_default() == "production";
    init_tracing(is_production);

    tracing::info!("starting tutor coordination core");

    let cfg = AppConfig::from_env();

    let db = Db::connect(&cfg.database_url, cfg.db_pool_min, cfg.db_pool_max).await?;
    db.migrate().await?;
    let pool = (*db.pool).clone();

    let transport = build_transport(&cfg)?;
    let cache: Arc<dyn CacheClient> = Arc::new(RedisCache::connect(&cfg.redis_url).await?);

    let purchases = Arc::new(SqlxPurchaseRepository::new(pool.clone()));
    let allocations = Arc::new(SqlxAllocationRepository::new(pool.clone()));
    let sessions = Arc::new(SqlxSessionRepository::new(pool.clone()));
    let zones = Arc::new(SqlxZoneRepository::new(pool.clone()));
    let schedule_slots = Arc::new(SqlxScheduleSlotRepository::new(pool.clone()));
    let refresh_tokens = Arc::new(SqlxRefreshTokenRepository::new(pool.clone()));
    let idempotency = Arc::new(SqlxIdempotencyStore::new(pool.clone()));

    let metrics = Arc::new(Counters::default());

    let directory: Arc<dyn TrainerDirectory> =
        Arc::new(HttpTrainerDirectory::new(cfg.trainer_directory_url.clone(), cfg.http_call_timeout)?);

    let engine = Arc::new(AutoAssignmentEngine::new(
        directory,
        allocations.clone(),
        schedule_slots,
        zones.clone(),
        cfg.trainer_directory_retry,
    ));

    let dlq_emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "dlq"));
    let dlq = Arc::new(DlqPublisher::new(dlq_emitter, metrics.clone()));

    let purchase_emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "purchase-worker"));
    let purchase_worker = Arc::new(PurchaseWorker::new(
        purchases.clone(),
        idempotency.clone(),
        purchase_emitter,
        metrics.clone(),
    ));

    let allocation_emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "allocation-worker"));
    let allocation_worker = Arc::new(AllocationWorker::new(
        engine,
        allocations.clone(),
        zones,
        idempotency.clone(),
        allocation_emitter,
        metrics.clone(),
    ));

    let session_emitter = Arc::new(IdempotentEmitter::new(idempotency.clone(), transport.clone(), "session-worker"));
    let session_worker = Arc::new(SessionWorker::new(
        sessions,
        allocations,
        purchases,
        idempotency.clone(),
        session_emitter,
        cfg.rolling_window_size,
        cfg.top_up_threshold,
        cfg.default_time_slot.clone(),
        metrics.clone(),
    ));

    let cache_worker = Arc::new(CacheWorker::new(cache.clone(), metrics.clone()));

    // Wired up for whatever HTTP surface calls it; this core owns the
    // rotation protocol, not the route that invokes it.
    let refresh_lock = Arc::new(RefreshLockCoordinator::new(cache.clone(), cfg.refresh_lock_ttl));
    let _refresh_service = Arc::new(RefreshTokenService::new(
        refresh_lock,
        refresh_tokens,
        cfg.refresh_lock_wait,
        metrics.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let mut handles = Vec::new();

    {
        let transport = transport.clone();
        let policy = cfg.purchase_retry;
        let dlq = dlq.clone();
        let shutdown_rx = shutdown_rx.clone();
        let worker = purchase_worker.clone();
        handles.push(tokio::spawn(async move {
            run_worker_loop(
                "purchase-worker",
                "purchase-confirmed",
                "purchase-worker",
                transport,
                policy,
                Some(dlq),
                shutdown_rx,
                move |msg| {
                    let worker = worker.clone();
                    async move { worker.handle(msg).await }
                },
            )
            .await;
        }));
    }

    {
        let transport = transport.clone();
        let policy = cfg.allocation_retry;
        let dlq = dlq.clone();
        let shutdown_rx = shutdown_rx.clone();
        let worker = allocation_worker.clone();
        handles.push(tokio::spawn(async move {
            run_worker_loop(
                "allocation-worker",
                "purchase-created",
                "allocation-worker",
                transport,
                policy,
                Some(dlq),
                shutdown_rx,
                move |msg| {
                    let worker = worker.clone();
                    async move { worker.handle(msg).await }
                },
            )
            .await;
        }));
    }

    {
        let transport = transport.clone();
        let policy = cfg.session_retry;
        let dlq = dlq.clone();
        let shutdown_rx = shutdown_rx.clone();
        let worker = session_worker.clone();
        handles.push(tokio::spawn(async move {
            run_worker_loop(
                "session-worker",
                "trainer-allocated",
                "session-worker",
                transport,
                policy,
                Some(dlq),
                shutdown_rx,
                move |msg| {
                    let worker = worker.clone();
                    async move { worker.handle(msg).await }
                },
            )
            .await;
        }));
    }

    {
        let session_worker = session_worker.clone();
        let shutdown_rx = shutdown_rx.clone();
        let interval = cfg.top_up_interval;
        handles.push(tokio::spawn(async move {
            session_worker.run_topup_loop(interval, shutdown_rx).await;
        }));
    }

    // Cache invalidation rides on all three downstream topics; a DLQ entry
    // for a best-effort failure would never happen (run_worker_loop swallows
    // `AppError::BestEffort` before reaching the DLQ branch), so `dlq` is
    // omitted here.
    for topic in ["purchase-created", "trainer-allocated", "sessions-generated"] {
        let transport = transport.clone();
        let policy = cfg.cache_retry;
        let shutdown_rx = shutdown_rx.clone();
        let worker = cache_worker.clone();
        handles.push(tokio::spawn(async move {
            run_worker_loop(
                "cache-worker",
                topic,
                "cache-worker",
                transport,
                policy,
                None,
                shutdown_rx,
                move |msg| {
                    let worker = worker.clone();
                    async move { worker.handle(msg).await }
                },
            )
            .await;
        }));
    }

    tracing::info!("tutor coordination core started; waiting for shutdown signal");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining workers");

    let _ = shutdown_tx.send(true);

    if tokio::time::timeout(cfg.shutdown_grace, futures::future::join_all(handles))
        .await
        .is_err()
    {
        tracing::warn!("shutdown grace period elapsed before all workers drained");
    }

    Ok(())
}
