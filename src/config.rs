use std::time::Duration;

/// Exponential backoff policy for a single worker's retry executor (C4).
///
/// Delays follow `initial * multiplier^(attempt - 1)`, capped at `max_delay`.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        debug_assert!(attempt >= 1);
        let factor = self.multiplier.powi(attempt as i32 - 1);
        let millis = (self.initial_delay.as_millis() as f64 * factor).min(self.max_delay.as_millis() as f64);
        Duration::from_millis(millis.max(0.0) as u64)
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string (relational store of record).
    pub database_url: String,
    /// Redis connection string backing the cache + refresh-lock coordinator.
    pub redis_url: String,

    // =========================
    // Rolling-window scheduler (C7)
    // =========================
    /// Target number of future sessions materialised right after allocation (S2).
    pub rolling_window_size: u32,
    /// Minimum number of future sessions a sweep must top up to (S2).
    pub top_up_threshold: u32,
    /// Cadence of the periodic top-up sweep.
    pub top_up_interval: Duration,
    /// Hard-coded fallback time slot used by the periodic sweep when an
    /// allocation's metadata carries none (see SPEC_FULL §4.4-4.9 open question).
    pub default_time_slot: String,

    // =========================
    // Retry policies per worker (C4)
    // =========================
    pub purchase_retry: RetryPolicy,
    pub allocation_retry: RetryPolicy,
    pub session_retry: RetryPolicy,
    pub cache_retry: RetryPolicy,
    /// Retry policy around the trainer directory HTTP fetch (§4.6 step 1).
    pub trainer_directory_retry: RetryPolicy,

    // =========================
    // Pool / timeout bounds (C5)
    // =========================
    pub db_pool_min: u32,
    pub db_pool_max: u32,
    pub db_call_timeout: Duration,
    pub http_call_timeout: Duration,
    pub cache_call_timeout: Duration,

    // =========================
    // Cache TTLs and refresh lock
    // =========================
    pub cache_ttl: Duration,
    pub refresh_lock_ttl: Duration,
    pub refresh_lock_wait: Duration,

    // =========================
    // Transport / channel capacities
    // =========================
    pub topic_partitions: usize,
    pub consumer_channel_capacity: usize,

    /// Grace period workers are given to drain in-flight handlers on shutdown.
    pub shutdown_grace: Duration,

    // =========================
    // Trainer directory (C14) / refresh-token protocol (C9)
    // =========================
    /// Base URL of the external trainer directory HTTP collaborator.
    pub trainer_directory_url: String,
    /// Access token lifetime minted on a successful refresh rotation.
    pub access_token_ttl: Duration,

    /// Bootstrap servers for the `kafka` feature's transport; unused otherwise.
    pub kafka_bootstrap_servers: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://tutor_coordination_dev.db".to_string());
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());

        let standard_retry = RetryPolicy {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        };

        Self {
            database_url,
            redis_url,

            rolling_window_size: 7,
            top_up_threshold: 3,
            top_up_interval: Duration::from_secs(6 * 3600),
            default_time_slot: "16:00".to_string(),

            purchase_retry: standard_retry,
            allocation_retry: standard_retry,
            session_retry: standard_retry,
            cache_retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                multiplier: 2.0,
                max_delay: Duration::from_secs(5),
            },
            trainer_directory_retry: RetryPolicy {
                max_attempts: 3,
                initial_delay: Duration::from_millis(500),
                multiplier: 2.0,
                max_delay: Duration::from_secs(5),
            },

            db_pool_min: 10,
            db_pool_max: 50,
            db_call_timeout: Duration::from_secs(30),
            http_call_timeout: Duration::from_secs(10),
            cache_call_timeout: Duration::from_millis(500),

            cache_ttl: Duration::from_secs(15 * 60),
            refresh_lock_ttl: Duration::from_secs(10),
            refresh_lock_wait: Duration::from_millis(750),

            topic_partitions: 3,
            consumer_channel_capacity: 256,

            shutdown_grace: Duration::from_secs(30),

            trainer_directory_url: std::env::var("TRAINER_DIRECTORY_URL")
                .unwrap_or_else(|_| "http://trainer-directory.internal".to_string()),
            access_token_ttl: Duration::from_secs(15 * 60),

            kafka_bootstrap_servers: std::env::var("KAFKA_BOOTSTRAP_SERVERS")
                .unwrap_or_else(|_| "localhost:9092".to_string()),
        }
    }
}
