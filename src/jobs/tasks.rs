/// Background task implementations
use crate::{context::AppContext, error::ApiResult};

/// Drop refresh token ledger rows that have passed their expiry
pub async fn purge_expired_refresh_tokens(ctx: &AppContext) -> ApiResult<u64> {
    ctx.tokens.purge_expired().await
}

/// Forget rate limiter keys that are back at full capacity
///
/// Returns the number of keys still tracked.
pub fn compact_rate_limits(ctx: &AppContext) -> usize {
    ctx.rate_limiter.retain_recent();
    ctx.rate_limiter.tracked_keys()
}

/// Health check - verify the database answers
pub async fn health_check(ctx: &AppContext) -> ApiResult<()> {
    sqlx::query("SELECT 1").fetch_one(&ctx.db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::ServerConfig, db, social::ProviderRegistry};
    use chrono::Utc;

    async fn context() -> AppContext {
        let pool = db::create_memory_pool().await.unwrap();
        AppContext::from_parts(ServerConfig::default(), pool, ProviderRegistry::new()).unwrap()
    }

    #[tokio::test]
    async fn test_purge_removes_only_expired_rows() {
        let ctx = context().await;
        let now = Utc::now().timestamp();
        for (jti, expires_at) in [("old", now - 10), ("live", now + 3600)] {
            sqlx::query(
                "INSERT INTO refresh_token (jti, account_id, issued_at, expires_at)
                 VALUES (?1, 1, ?2, ?3)",
            )
            .bind(jti)
            .bind(now - 100)
            .bind(expires_at)
            .execute(&ctx.db)
            .await
            .unwrap();
        }

        assert_eq!(purge_expired_refresh_tokens(&ctx).await.unwrap(), 1);
        assert!(ctx.tokens.store().get("live").await.unwrap().is_some());
        assert!(ctx.tokens.store().get("old").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_health_check_and_compaction() {
        let ctx = context().await;
        health_check(&ctx).await.unwrap();
        assert_eq!(compact_rate_limits(&ctx), 0);
    }
}
