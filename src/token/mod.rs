/// Token issuance
///
/// Access tokens are stateless HS256 JWTs that live for a short window.
/// Refresh tokens are JWTs tracked by `jti` in the refresh token ledger;
/// every refresh rotates the token and denylists the old one.

mod store;

pub use store::TokenStore;

use crate::{
    account::AccountManager,
    config::AuthConfig,
    db::models::Account,
    error::{ApiError, ApiResult},
};
use chrono::Utc;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT claim set shared by both token types
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Account id
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    pub token_type: TokenType,
}

/// Access + refresh pair handed to clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// Token validation failure
///
/// Both variants surface to clients as the same generic invalid-token error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("token malformed")]
    Malformed,
}

impl From<TokenError> for ApiError {
    fn from(_: TokenError) -> Self {
        ApiError::InvalidToken
    }
}

/// Token issuer service
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    access_ttl: i64,
    refresh_ttl: i64,
    store: TokenStore,
    accounts: Arc<AccountManager>,
}

impl TokenIssuer {
    pub fn new(config: &AuthConfig, store: TokenStore, accounts: Arc<AccountManager>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_ttl: config.access_token_ttl as i64,
            refresh_ttl: config.refresh_token_ttl as i64,
            store,
            accounts,
        }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Issue a token pair for an active account
    pub async fn issue(&self, account: &Account) -> ApiResult<TokenPair> {
        if !account.is_active {
            return Err(ApiError::InvalidCredentials(
                "User account is disabled".to_string(),
            ));
        }

        let mut conn = self.store.pool().acquire().await?;
        let pair = self.mint_pair(&mut *conn, account.id).await?;

        debug!("Issued token pair for account {}", account.id);
        Ok(pair)
    }

    /// Rotate a refresh token into a new pair
    pub async fn refresh(&self, refresh_token: &str) -> ApiResult<TokenPair> {
        let claims = match self.decode(refresh_token, true) {
            Ok(claims) => claims,
            Err(kind) => {
                debug!("Refresh rejected: {}", kind);
                return Err(ApiError::InvalidToken);
            }
        };
        if claims.token_type != TokenType::Refresh {
            debug!("Refresh rejected: presented an access token");
            return Err(ApiError::InvalidToken);
        }
        let account_id = parse_subject(&claims)?;

        match self.accounts.get_account(account_id).await? {
            Some(account) if account.is_active => {}
            _ => {
                debug!("Refresh rejected: account {} missing or inactive", account_id);
                return Err(ApiError::InvalidToken);
            }
        }

        let now = Utc::now().timestamp();
        let mut tx = self.store.pool().begin().await?;

        if !TokenStore::consume(&mut *tx, &claims.jti, now).await? {
            tx.rollback().await?;
            match self.store.get(&claims.jti).await? {
                Some(record) if record.revoked_at.is_some() => warn!(
                    "Refresh token reuse detected for account {} (jti {})",
                    record.account_id, record.jti
                ),
                Some(_) => debug!("Refresh rejected: token {} past ledger expiry", claims.jti),
                None => debug!("Refresh rejected: unknown token {}", claims.jti),
            }
            return Err(ApiError::InvalidToken);
        }

        let pair = self.mint_pair(&mut *tx, account_id).await?;
        tx.commit().await?;

        debug!("Rotated refresh token for account {}", account_id);
        Ok(pair)
    }

    /// Denylist a refresh token; idempotent
    ///
    /// Expired tokens are still accepted so a late logout succeeds. Only a
    /// token that fails signature or structure checks is rejected.
    pub async fn revoke(&self, refresh_token: &str) -> ApiResult<()> {
        let claims = match self.decode(refresh_token, false) {
            Ok(claims) => claims,
            Err(kind) => {
                debug!("Revoke rejected: {}", kind);
                return Err(ApiError::InvalidToken);
            }
        };
        if claims.token_type != TokenType::Refresh {
            return Err(ApiError::InvalidToken);
        }
        let account_id = parse_subject(&claims)?;

        self.store
            .revoke(
                &claims.jti,
                account_id,
                claims.iat,
                claims.exp,
                Utc::now().timestamp(),
            )
            .await?;

        info!("Revoked refresh token for account {}", account_id);
        Ok(())
    }

    /// Stateless access token check; never consults the ledger
    pub fn validate(&self, access_token: &str) -> Result<i64, TokenError> {
        let claims = self.decode(access_token, true)?;
        if claims.token_type != TokenType::Access {
            return Err(TokenError::Malformed);
        }
        claims.sub.parse().map_err(|_| TokenError::Malformed)
    }

    /// Drop ledger rows for tokens that can no longer be presented
    pub async fn purge_expired(&self) -> ApiResult<u64> {
        self.store.purge_expired(Utc::now().timestamp()).await
    }

    async fn mint_pair(
        &self,
        conn: &mut sqlx::SqliteConnection,
        account_id: i64,
    ) -> ApiResult<TokenPair> {
        let now = Utc::now().timestamp();

        let access = self.encode(&Claims {
            sub: account_id.to_string(),
            exp: now + self.access_ttl,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            token_type: TokenType::Access,
        })?;

        let refresh_claims = Claims {
            sub: account_id.to_string(),
            exp: now + self.refresh_ttl,
            iat: now,
            jti: Uuid::new_v4().to_string(),
            token_type: TokenType::Refresh,
        };
        let refresh = self.encode(&refresh_claims)?;

        TokenStore::record_issued(
            conn,
            &refresh_claims.jti,
            account_id,
            refresh_claims.iat,
            refresh_claims.exp,
        )
        .await?;

        Ok(TokenPair { access, refresh })
    }

    pub(crate) fn encode(&self, claims: &Claims) -> ApiResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| ApiError::Internal(format!("Failed to sign token: {}", e)))
    }

    fn decode(&self, token: &str, check_expiry: bool) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = check_expiry;
        validation.set_required_spec_claims(&["exp", "sub"]);

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                other => {
                    debug!("JWT decode failed: {:?}", other);
                    TokenError::Malformed
                }
            })
    }
}

fn parse_subject(claims: &Claims) -> ApiResult<i64> {
    claims.sub.parse().map_err(|_| ApiError::InvalidToken)
}
