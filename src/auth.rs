/// Authentication extractors
use crate::{
    api::middleware::extract_bearer_token,
    context::AppContext,
    db::models::Account,
    error::{ApiError, ApiResult},
};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Authenticated context - the active account behind a valid access token
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub account: Account,
}

impl AuthContext {
    pub fn account_id(&self) -> i64 {
        self.account.id
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let account = current_account(state, &parts.headers).await?;
        Ok(AuthContext { account })
    }
}

/// Resolve the caller; any failure is reported as plain Unauthenticated
pub async fn current_account(ctx: &AppContext, headers: &HeaderMap) -> ApiResult<Account> {
    let token = extract_bearer_token(headers).ok_or(ApiError::Unauthenticated)?;

    let account_id = ctx.tokens.validate(&token).map_err(|e| {
        tracing::debug!("Rejected access token: {}", e);
        ApiError::Unauthenticated
    })?;

    match ctx.accounts.get_account(account_id).await? {
        Some(account) if account.is_active => Ok(account),
        Some(_) => {
            tracing::debug!("Access token for inactive account {}", account_id);
            Err(ApiError::Unauthenticated)
        }
        None => Err(ApiError::Unauthenticated),
    }
}
