/// Comment endpoints, nested under a post
use crate::{
    api::posts::readable_post,
    auth::AuthContext,
    authz::{self, PostComment},
    context::AppContext,
    error::{ApiError, ApiResult},
    post::{CommentView, CreateCommentRequest, UpdateCommentRequest},
    rate_limit::RateLimitScope,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use validator::Validate;

/// Build comment routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/posts/:id/comments", get(list_comments).post(create_comment))
        .route(
            "/posts/:id/comments/:comment_id",
            put(replace_comment)
                .patch(patch_comment)
                .delete(delete_comment),
        )
}

async fn list_comments(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<Vec<CommentView>>> {
    let post = readable_post(&ctx, &auth.account, post_id).await?;
    let comments = ctx.comments.list(post.id).await?;
    Ok(Json(comments.into_iter().map(CommentView::from).collect()))
}

async fn create_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(post_id): Path<i64>,
    WithRejection(Json(req), _): WithRejection<Json<CreateCommentRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    ctx.rate_limiter
        .check(RateLimitScope::CommentCreate, &auth.account_id().to_string())?;
    let post = readable_post(&ctx, &auth.account, post_id).await?;
    req.validate()?;

    let row = ctx
        .comments
        .create(post.id, auth.account_id(), &req.text, req.parent)
        .await?;
    Ok((StatusCode::CREATED, Json(row.into())))
}

async fn replace_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateCommentRequest>, ApiError>,
) -> ApiResult<Json<CommentView>> {
    update_comment(ctx, auth, post_id, comment_id, req, true).await
}

async fn patch_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, comment_id)): Path<(i64, i64)>,
    WithRejection(Json(req), _): WithRejection<Json<UpdateCommentRequest>, ApiError>,
) -> ApiResult<Json<CommentView>> {
    update_comment(ctx, auth, post_id, comment_id, req, false).await
}

async fn update_comment(
    ctx: AppContext,
    auth: AuthContext,
    post_id: i64,
    comment_id: i64,
    req: UpdateCommentRequest,
    full: bool,
) -> ApiResult<Json<CommentView>> {
    let post = readable_post(&ctx, &auth.account, post_id).await?;
    let row = ctx
        .comments
        .get(post.id, comment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;
    authz::ensure_modifiable(
        &auth.account,
        &PostComment {
            post: &post,
            comment: &row.comment,
        },
    )?;
    req.validate()?;

    let updated = match req.text {
        Some(text) => ctx.comments.update(&row.comment, &text).await?,
        None if full => {
            return Err(ApiError::invalid_field("text", "This field is required."));
        }
        None => row,
    };
    Ok(Json(updated.into()))
}

async fn delete_comment(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, comment_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let post = readable_post(&ctx, &auth.account, post_id).await?;
    let row = ctx
        .comments
        .get(post.id, comment_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;
    authz::ensure_modifiable(
        &auth.account,
        &PostComment {
            post: &post,
            comment: &row.comment,
        },
    )?;

    ctx.comments.delete(&row.comment).await?;
    Ok(StatusCode::NO_CONTENT)
}
