use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::AppError;
use crate::metrics::Counters;
use crate::refresh_lock::RefreshLockCoordinator;
use crate::repository::RefreshTokenRepository;

/// Outcome of a successful rotation, handed back to the caller to mint a
/// session cookie / response body. Minting the actual JWT/opaque token
/// bytes is out of scope here — the caller supplies the already-generated
/// `new_token_hash` and receives back the row identity and its expiry.
#[derive(Clone, Debug)]
pub struct RotatedToken {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: i64,
}

/// Orchestrates the full refresh-token rotation protocol (§4.10): acquire
/// the per-session lock, validate the presented token under it, rotate, then
/// always release — win or lose.
pub struct RefreshTokenService {
    lock: Arc<RefreshLockCoordinator>,
    tokens: Arc<dyn RefreshTokenRepository>,
    wait_timeout: Duration,
    metrics: Arc<Counters>,
}

impl RefreshTokenService {
    pub fn new(
        lock: Arc<RefreshLockCoordinator>,
        tokens: Arc<dyn RefreshTokenRepository>,
        wait_timeout: Duration,
        metrics: Arc<Counters>,
    ) -> Self {
        Self { lock, tokens, wait_timeout, metrics }
    }

    /// Rotates the refresh token presented for `session_id`. Returns
    /// `AppError::RefreshConflict` if the lock is still held after one wait
    /// cycle (caller should answer 429), `AppError::RefreshStale` if the
    /// presented token is unknown, revoked, or expired (caller should answer
    /// 401).
    pub async fn rotate(
        &self,
        session_id: &str,
        old_token_hash: &str,
        new_token_hash: &str,
        ttl_ms: i64,
    ) -> Result<RotatedToken, AppError> {
        let handle = match self
            .lock
            .acquire_with_single_retry(session_id, self.wait_timeout)
            .await
            .map_err(AppError::transient)?
        {
            Some(handle) => handle,
            None => {
                self.metrics.refresh_conflicts.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                return Err(AppError::RefreshConflict);
            }
        };

        let result = self.rotate_locked(old_token_hash, new_token_hash, ttl_ms).await;
        self.lock.release(handle).await;
        match &result {
            Ok(_) => {
                self.metrics.refresh_rotations.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Err(AppError::RefreshStale) => {
                self.metrics.refresh_stale.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            }
            Err(_) => {}
        }
        result
    }

    async fn rotate_locked(&self, old_token_hash: &str, new_token_hash: &str, ttl_ms: i64) -> Result<RotatedToken, AppError> {
        let record = self
            .tokens
            .find_by_hash(old_token_hash)
            .await
            .map_err(AppError::transient)?
            .ok_or(AppError::RefreshStale)?;

        let now = crate::time::now_ms() as i64;
        if !record.is_live(now) {
            return Err(AppError::RefreshStale);
        }

        let new_expires_at = now + ttl_ms;
        let token_id = self
            .tokens
            .rotate(old_token_hash, new_token_hash, record.user_id, new_expires_at)
            .await
            .map_err(AppError::transient)?;

        Ok(RotatedToken {
            token_id,
            user_id: record.user_id,
            token_hash: new_token_hash.to_string(),
            expires_at: new_expires_at,
        })
    }
}
