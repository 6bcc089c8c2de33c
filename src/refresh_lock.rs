use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::cache::{CacheClient, refresh_lock_key};

/// Distributed per-session mutex serialising refresh-token rotation (C9,
/// §4.10). Acquisition is `SET key NX PX ttl`; release is best-effort `DEL`.
pub struct RefreshLockCoordinator {
    cache: Arc<dyn CacheClient>,
    ttl: Duration,
    wait_poll_interval: Duration,
}

/// Proof of acquisition; release requires holding this rather than a bare
/// session id so a caller can't accidentally release a lock it never held.
pub struct LockHandle {
    session_id: String,
    token: String,
}

impl RefreshLockCoordinator {
    pub fn new(cache: Arc<dyn CacheClient>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            wait_poll_interval: Duration::from_millis(25),
        }
    }

    pub async fn acquire(&self, session_id: &str) -> anyhow::Result<Option<LockHandle>> {
        let token = Uuid::new_v4().to_string();
        let key = refresh_lock_key(session_id);
        let acquired = self.cache.set_nx(&key, &token, self.ttl).await?;
        if acquired {
            Ok(Some(LockHandle {
                session_id: session_id.to_string(),
                token,
            }))
        } else {
            Ok(None)
        }
    }

    /// Polls until the lock is released or `timeout` elapses, then returns
    /// whether the caller should try acquiring again.
    pub async fn wait(&self, session_id: &str, timeout: Duration) -> anyhow::Result<bool> {
        let key = refresh_lock_key(session_id);
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.cache.exists(&key).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(self.wait_poll_interval).await;
        }
    }

    /// Acquire-or-wait-then-retry-once, matching the refresh-path protocol
    /// step 2 in §4.10: returns `None` when the caller should respond 429.
    pub async fn acquire_with_single_retry(
        &self,
        session_id: &str,
        wait_timeout: Duration,
    ) -> anyhow::Result<Option<LockHandle>> {
        if let Some(handle) = self.acquire(session_id).await? {
            return Ok(Some(handle));
        }
        self.wait(session_id, wait_timeout).await?;
        self.acquire(session_id).await
    }

    pub async fn release(&self, handle: LockHandle) {
        let key = refresh_lock_key(&handle.session_id);
        match self.cache.get(&key).await {
            Ok(Some(current)) if current == handle.token => {
                if let Err(e) = self.cache.del(&key).await {
                    tracing::warn!(session_id = %handle.session_id, error = %e, "refresh lock release failed");
                }
            }
            Ok(_) => {
                // TTL already expired and someone else holds it now; don't
                // release a lock we no longer own.
            }
            Err(e) => {
                tracing::warn!(session_id = %handle.session_id, error = %e, "refresh lock release lookup failed");
            }
        }
    }
}
