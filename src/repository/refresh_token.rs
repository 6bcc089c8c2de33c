use async_trait::async_trait;
use sqlx::{AnyPool, Row};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
}

impl RefreshTokenRecord {
    pub fn is_live(&self, now_ms: i64) -> bool {
        self.revoked_at.is_none() && self.expires_at > now_ms
    }
}

/// Backs the refresh-token rotation protocol (C9, §4.10 step 3).
///
/// `rotate` mints the new token row before revoking the old one — a
/// concurrent request that slipped past the lock on another node then
/// observes either the old-still-valid or the new-valid state, never
/// both-revoked.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync + 'static {
    async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<RefreshTokenRecord>>;

    async fn rotate(
        &self,
        old_token_hash: &str,
        new_token_hash: &str,
        user_id: Uuid,
        new_expires_at: i64,
    ) -> anyhow::Result<Uuid>;
}

pub struct SqlxRefreshTokenRepository {
    pool: AnyPool,
}

impl SqlxRefreshTokenRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for SqlxRefreshTokenRepository {
    async fn find_by_hash(&self, token_hash: &str) -> anyhow::Result<Option<RefreshTokenRecord>> {
        let row = sqlx::query(
            r#"SELECT id, user_id, expires_at, revoked_at FROM refresh_tokens WHERE token_hash = ?;"#,
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;

        let Some(r) = row else { return Ok(None) };
        let id: String = r.try_get("id")?;
        let user_id: String = r.try_get("user_id")?;
        Ok(Some(RefreshTokenRecord {
            id: Uuid::parse_str(&id)?,
            user_id: Uuid::parse_str(&user_id)?,
            expires_at: r.try_get("expires_at")?,
            revoked_at: r.try_get("revoked_at")?,
        }))
    }

    async fn rotate(
        &self,
        old_token_hash: &str,
        new_token_hash: &str,
        user_id: Uuid,
        new_expires_at: i64,
    ) -> anyhow::Result<Uuid> {
        let mut tx = self.pool.begin().await?;
        let new_id = Uuid::new_v4();

        sqlx::query(
            r#"INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, revoked_at)
               VALUES (?, ?, ?, ?, NULL);"#,
        )
        .bind(new_id.to_string())
        .bind(user_id.to_string())
        .bind(new_token_hash)
        .bind(new_expires_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(r#"UPDATE refresh_tokens SET revoked_at = ? WHERE token_hash = ?;"#)
            .bind(crate::time::now_ms() as i64)
            .bind(old_token_hash)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(new_id)
    }
}
