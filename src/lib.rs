pub mod assignment;
pub mod cache;
pub mod config;
pub mod db;
pub mod dlq;
pub mod domain;
pub mod error;
pub mod events;
pub mod idempotency;
pub mod logger;
pub mod metrics;
pub mod refresh;
pub mod refresh_lock;
pub mod repository;
pub mod retry;
pub mod schedule;
pub mod time;
pub mod trainer_directory;
pub mod transport;
pub mod workers;
