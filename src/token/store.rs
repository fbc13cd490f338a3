/// Refresh token ledger
///
/// Every issued refresh token gets a row keyed by its `jti`. A row with
/// `revoked_at` set is a denylist entry: rotated or logged out.
use crate::{db::models::RefreshTokenRecord, error::ApiResult};
use sqlx::{SqliteConnection, SqlitePool};

#[derive(Clone)]
pub struct TokenStore {
    db: SqlitePool,
}

impl TokenStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.db
    }

    /// Record a freshly issued refresh token
    pub async fn record_issued(
        conn: &mut SqliteConnection,
        jti: &str,
        account_id: i64,
        issued_at: i64,
        expires_at: i64,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO refresh_token (jti, account_id, issued_at, expires_at, revoked_at)
             VALUES (?1, ?2, ?3, ?4, NULL)",
        )
        .bind(jti)
        .bind(account_id)
        .bind(issued_at)
        .bind(expires_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Atomically invalidate a live token
    ///
    /// Returns true only for the single caller whose UPDATE flipped the row.
    pub async fn consume(conn: &mut SqliteConnection, jti: &str, now: i64) -> ApiResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_token SET revoked_at = ?1
             WHERE jti = ?2 AND revoked_at IS NULL AND expires_at > ?1",
        )
        .bind(now)
        .bind(jti)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Denylist a token id; keeps the first revocation time
    pub async fn revoke(
        &self,
        jti: &str,
        account_id: i64,
        issued_at: i64,
        expires_at: i64,
        now: i64,
    ) -> ApiResult<()> {
        sqlx::query(
            "INSERT INTO refresh_token (jti, account_id, issued_at, expires_at, revoked_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(jti) DO UPDATE
             SET revoked_at = COALESCE(refresh_token.revoked_at, excluded.revoked_at)",
        )
        .bind(jti)
        .bind(account_id)
        .bind(issued_at)
        .bind(expires_at)
        .bind(now)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn get(&self, jti: &str) -> ApiResult<Option<RefreshTokenRecord>> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT * FROM refresh_token WHERE jti = ?1",
        )
        .bind(jti)
        .fetch_optional(&self.db)
        .await?;
        Ok(record)
    }

    /// Delete rows whose token can no longer be presented
    pub async fn purge_expired(&self, now: i64) -> ApiResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_token WHERE expires_at <= ?1")
            .bind(now)
            .execute(&self.db)
            .await?;
        Ok(result.rows_affected())
    }
}
