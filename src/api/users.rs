/// Account detail and own-profile endpoints
use crate::{
    account::{AccountView, UpdateProfileRequest},
    auth::AuthContext,
    context::AppContext,
    db::models::Profile,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use axum_extra::extract::WithRejection;
use validator::Validate;

/// Build user routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route(
            "/users/profile",
            get(get_profile).put(update_profile).patch(update_profile),
        )
        .route("/users/:id", get(get_user))
}

async fn get_user(
    State(ctx): State<AppContext>,
    _auth: AuthContext,
    Path(id): Path<i64>,
) -> ApiResult<Json<AccountView>> {
    let account = ctx
        .accounts
        .get_account(id)
        .await?
        .filter(|account| account.is_active)
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let profile = ctx.accounts.get_profile(account.id).await?;

    Ok(Json(AccountView::new(&account, profile)))
}

async fn get_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> ApiResult<Json<Profile>> {
    let profile = ctx
        .accounts
        .get_profile(auth.account_id())
        .await?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;
    Ok(Json(profile))
}

async fn update_profile(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    WithRejection(Json(req), _): WithRejection<Json<UpdateProfileRequest>, ApiError>,
) -> ApiResult<Json<Profile>> {
    req.validate()?;
    let profile = ctx.accounts.update_profile(auth.account_id(), &req).await?;
    Ok(Json(profile))
}
