pub mod inmemory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;

/// Read-model cache abstraction backing the student `home`/`learning` views
/// (C8, §4.9) and, via key-existence only, the refresh lock (C9).
#[async_trait]
pub trait CacheClient: Send + Sync + 'static {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()>;
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn del(&self, key: &str) -> anyhow::Result<()>;

    /// `SET key value NX PX ttl` — succeeds only if `key` was absent.
    async fn set_nx(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<bool>;

    async fn exists(&self, key: &str) -> anyhow::Result<bool>;
}

pub fn student_home_key(student_id: &str) -> String {
    format!("student:home:{student_id}")
}

pub fn student_learning_key(student_id: &str) -> String {
    format!("student:learning:{student_id}")
}

pub fn refresh_lock_key(session_id: &str) -> String {
    format!("refresh-lock:{session_id}")
}
