/// Maps verified provider claims onto local accounts
use crate::{
    account::{
        default_display_name, insert_account, insert_profile, normalize_email, AccountManager,
        NewAccount,
    },
    db::{
        self,
        models::{Account, SocialIdentity},
    },
    error::{ApiError, ApiResult},
    social::{ProviderRegistry, VerifiedClaims},
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info};

pub struct SocialLinker {
    db: SqlitePool,
    registry: ProviderRegistry,
    accounts: Arc<AccountManager>,
}

impl SocialLinker {
    pub fn new(db: SqlitePool, registry: ProviderRegistry, accounts: Arc<AccountManager>) -> Self {
        Self {
            db,
            registry,
            accounts,
        }
    }

    /// Verify a provider token with the named provider
    pub async fn exchange(&self, provider: &str, provider_token: &str) -> ApiResult<VerifiedClaims> {
        let identity_provider = self
            .registry
            .get(provider)
            .ok_or_else(|| ApiError::NotFound(format!("Unknown identity provider: {}", provider)))?;

        let claims = identity_provider.verify(provider_token).await?;

        if claims.subject.trim().is_empty() {
            return Err(ApiError::ProviderRejected(
                "Provider returned no subject".to_string(),
            ));
        }
        if claims.email.trim().is_empty() {
            return Err(ApiError::ProviderRejected(
                "Provider returned no email address".to_string(),
            ));
        }

        Ok(claims)
    }

    /// Find or create the local account for provider claims
    ///
    /// Order: linked identity, then account with the same email, then a new
    /// account. Returns the account and whether it was created.
    pub async fn resolve(
        &self,
        provider: &str,
        claims: &VerifiedClaims,
    ) -> ApiResult<(Account, bool)> {
        match self.try_resolve(provider, claims).await {
            // A concurrent login for the same identity or email won the insert
            Err(ApiError::Database(e)) if db::is_unique_violation(&e) => {
                debug!("Social resolve raced on {} identity, retrying", provider);
                self.try_resolve(provider, claims).await
            }
            other => other,
        }
    }

    async fn try_resolve(
        &self,
        provider: &str,
        claims: &VerifiedClaims,
    ) -> ApiResult<(Account, bool)> {
        if let Some(account) = self.find_linked(provider, &claims.subject).await? {
            debug!("{} identity already linked to account {}", provider, account.id);
            return Ok((account, false));
        }

        let email = normalize_email(&claims.email);

        if let Some(account) = self.accounts.get_by_email(&email).await? {
            if !claims.email_verified {
                return Err(ApiError::ProviderRejected(
                    "Email address is not verified by the provider".to_string(),
                ));
            }

            let mut tx = self.db.begin().await?;
            insert_identity(&mut *tx, account.id, provider, claims).await?;
            if !account.email_verified {
                sqlx::query("UPDATE account SET email_verified = 1 WHERE id = ?1")
                    .bind(account.id)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;

            info!("Linked {} identity to existing account {}", provider, account.id);
            return Ok((account, false));
        }

        let display_name = claims
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_display_name(&email));

        let mut tx = self.db.begin().await?;
        let account = insert_account(
            &mut *tx,
            NewAccount {
                email: &email,
                password_hash: None,
                email_verified: claims.email_verified,
            },
        )
        .await?;
        insert_profile(&mut *tx, account.id, &display_name, claims.picture.as_deref()).await?;
        insert_identity(&mut *tx, account.id, provider, claims).await?;
        tx.commit().await?;

        info!("Created account {} from {} login", account.id, provider);
        Ok((account, true))
    }

    async fn find_linked(&self, provider: &str, subject: &str) -> ApiResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(
            "SELECT a.* FROM account a
             JOIN social_identity s ON s.account_id = a.id
             WHERE s.provider = ?1 AND s.provider_user_id = ?2",
        )
        .bind(provider)
        .bind(subject)
        .fetch_optional(&self.db)
        .await?;
        Ok(account)
    }

    /// Identities linked to an account, ordered by provider
    pub async fn identities(&self, account_id: i64) -> ApiResult<Vec<SocialIdentity>> {
        let identities = sqlx::query_as::<_, SocialIdentity>(
            "SELECT * FROM social_identity WHERE account_id = ?1 ORDER BY provider",
        )
        .bind(account_id)
        .fetch_all(&self.db)
        .await?;
        Ok(identities)
    }
}

async fn insert_identity(
    conn: &mut SqliteConnection,
    account_id: i64,
    provider: &str,
    claims: &VerifiedClaims,
) -> ApiResult<()> {
    let extra_data = serde_json::to_string(claims)
        .map_err(|e| ApiError::Internal(format!("Failed to encode provider claims: {}", e)))?;

    sqlx::query(
        "INSERT INTO social_identity (account_id, provider, provider_user_id, extra_data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(account_id)
    .bind(provider)
    .bind(&claims.subject)
    .bind(extra_data)
    .bind(Utc::now())
    .execute(conn)
    .await?;
    Ok(())
}
