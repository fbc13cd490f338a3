/// Registration, login, token rotation, logout and social login
use crate::{
    account::{AccountView, LoginRequest, RegisterRequest},
    context::AppContext,
    error::{ApiError, ApiResult},
    rate_limit::{ClientIp, RateLimitScope},
    token::TokenPair,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Build auth routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/token", post(obtain_token))
        .route("/auth/token/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        .route("/auth/social/:provider", post(social_login))
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: AccountView,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: AccountView,
}

#[derive(Debug, Serialize)]
pub struct SocialLoginResponse {
    pub user: AccountView,
    pub tokens: TokenPair,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SocialLoginRequest {
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

async fn register(
    State(ctx): State<AppContext>,
    ClientIp(ip): ClientIp,
    WithRejection(Json(req), _): WithRejection<Json<RegisterRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    ctx.rate_limiter.check(RateLimitScope::Register, &ip)?;
    req.validate()?;

    let account = ctx.accounts.create_account(&req).await?;
    let profile = ctx.accounts.get_profile(account.id).await?;
    let tokens = ctx.tokens.issue(&account).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: AccountView::new(&account, profile),
            tokens,
        }),
    ))
}

async fn obtain_token(
    State(ctx): State<AppContext>,
    ClientIp(ip): ClientIp,
    WithRejection(Json(req), _): WithRejection<Json<LoginRequest>, ApiError>,
) -> ApiResult<Json<LoginResponse>> {
    ctx.rate_limiter.check(RateLimitScope::Login, &ip)?;
    req.validate()?;

    let account = ctx.accounts.authenticate(&req.email, &req.password).await?;
    let profile = ctx.accounts.get_profile(account.id).await?;
    let tokens = ctx.tokens.issue(&account).await?;
    tracing::info!("Account {} logged in", account.id);

    Ok(Json(LoginResponse {
        access: tokens.access,
        refresh: tokens.refresh,
        user: AccountView::new(&account, profile),
    }))
}

async fn refresh_token(
    State(ctx): State<AppContext>,
    WithRejection(Json(req), _): WithRejection<Json<RefreshRequest>, ApiError>,
) -> ApiResult<Json<TokenPair>> {
    let token = required(req.refresh, "refresh")?;
    let pair = ctx.tokens.refresh(&token).await?;
    Ok(Json(pair))
}

/// Always succeeds; a bad or missing token has nothing to revoke
async fn logout(
    State(ctx): State<AppContext>,
    body: Option<Json<RefreshRequest>>,
) -> Json<MessageResponse> {
    if let Some(token) = body.and_then(|Json(req)| req.refresh) {
        if let Err(e) = ctx.tokens.revoke(&token).await {
            tracing::debug!("Logout with unusable refresh token: {}", e);
        }
    }

    Json(MessageResponse {
        message: "Successfully logged out",
    })
}

async fn social_login(
    State(ctx): State<AppContext>,
    Path(provider): Path<String>,
    ClientIp(ip): ClientIp,
    WithRejection(Json(req), _): WithRejection<Json<SocialLoginRequest>, ApiError>,
) -> ApiResult<Json<SocialLoginResponse>> {
    ctx.rate_limiter.check(RateLimitScope::Login, &ip)?;
    let provider_token = required(req.access_token, "access_token")?;

    let claims = ctx.social.exchange(&provider, &provider_token).await?;
    let (account, created) = ctx.social.resolve(&provider, &claims).await?;
    let tokens = ctx.tokens.issue(&account).await?;
    let profile = ctx.accounts.get_profile(account.id).await?;

    tracing::info!(
        "Social login via {} for account {} (created: {})",
        provider,
        account.id,
        created
    );

    Ok(Json(SocialLoginResponse {
        user: AccountView::new(&account, profile),
        tokens,
        created,
    }))
}

fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::invalid_field(field, format!("{} is required", field)))
}
