/// Post endpoints
use crate::{
    auth::AuthContext,
    authz::{self, PostMedia},
    context::AppContext,
    db::models::{Account, Post},
    error::{ApiError, ApiResult},
    post::{
        AuthorView, CreatePostRequest, LikeToggle, Page, Pagination, PostRow, PostView,
        UpdatePostRequest,
    },
    rate_limit::RateLimitScope,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::Serialize;
use validator::Validate;

/// Build post routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/posts", get(list_posts).post(create_post))
        .route(
            "/posts/:id",
            get(get_post)
                .put(replace_post)
                .patch(patch_post)
                .delete(delete_post),
        )
        .route("/posts/:id/like", post(toggle_like))
}

/// Response body carrying a confirmation message next to the resource
#[derive(Debug, Serialize)]
pub struct WithMessage<T> {
    pub message: &'static str,
    #[serde(flatten)]
    pub data: T,
}

/// Load a post the account may read; private posts of others are NotFound
pub(crate) async fn readable_post(
    ctx: &AppContext,
    account: &Account,
    post_id: i64,
) -> ApiResult<Post> {
    let post = ctx
        .posts
        .get(post_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    authz::ensure_readable(account, &post, "Post")?;
    Ok(post)
}

/// Assemble the API view; media is included only where the viewer may see it
async fn post_view(ctx: &AppContext, viewer: &Account, row: PostRow) -> ApiResult<PostView> {
    let tags = ctx.posts.tags_for(row.post.id).await?;
    let media = ctx
        .media
        .list_for_post(row.post.id)
        .await?
        .iter()
        .filter(|&media| {
            authz::can_access(
                viewer,
                &PostMedia {
                    post: &row.post,
                    media,
                },
            )
        })
        .map(|media| ctx.media.view(media))
        .collect();

    Ok(PostView {
        id: row.post.id,
        author: AuthorView {
            id: row.post.author_id,
            email: row.author_email,
        },
        title: row.post.title,
        content: row.post.content,
        privacy: row.post.privacy,
        tags,
        created_at: row.post.created_at,
        updated_at: row.post.updated_at,
        media,
        likes_count: row.likes_count,
        comments_count: row.comments_count,
    })
}

async fn load_view(ctx: &AppContext, viewer: &Account, post_id: i64) -> ApiResult<PostView> {
    let row = ctx
        .posts
        .get_row(post_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
    post_view(ctx, viewer, row).await
}

async fn list_posts(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(pagination): Query<Pagination>,
) -> ApiResult<Json<Page<PostView>>> {
    let (limit, offset) = pagination.normalized();
    let (rows, count) = ctx
        .posts
        .list_visible(auth.account_id(), limit, offset)
        .await?;

    let mut results = Vec::with_capacity(rows.len());
    for row in rows {
        results.push(post_view(&ctx, &auth.account, row).await?);
    }

    Ok(Json(Page {
        count,
        limit,
        offset,
        results,
    }))
}

async fn create_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    WithRejection(Json(req), _): WithRejection<Json<CreatePostRequest>, ApiError>,
) -> ApiResult<(StatusCode, Json<WithMessage<PostView>>)> {
    ctx.rate_limiter
        .check(RateLimitScope::PostCreate, &auth.account_id().to_string())?;
    req.validate()?;

    let post = ctx.posts.create(auth.account_id(), &req).await?;
    let view = load_view(&ctx, &auth.account, post.id).await?;

    Ok((
        StatusCode::CREATED,
        Json(WithMessage {
            message: "Post created successfully",
            data: view,
        }),
    ))
}

async fn get_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> ApiResult<Json<PostView>> {
    let post = readable_post(&ctx, &auth.account, id).await?;
    let view = load_view(&ctx, &auth.account, post.id).await?;
    Ok(Json(view))
}

async fn replace_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
    WithRejection(Json(req), _): WithRejection<Json<UpdatePostRequest>, ApiError>,
) -> ApiResult<Json<WithMessage<PostView>>> {
    update_post(ctx, auth, id, req, true).await
}

async fn patch_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
    WithRejection(Json(req), _): WithRejection<Json<UpdatePostRequest>, ApiError>,
) -> ApiResult<Json<WithMessage<PostView>>> {
    update_post(ctx, auth, id, req, false).await
}

/// Shared PUT/PATCH path; a full replacement must carry `content`
async fn update_post(
    ctx: AppContext,
    auth: AuthContext,
    id: i64,
    req: UpdatePostRequest,
    full: bool,
) -> ApiResult<Json<WithMessage<PostView>>> {
    let post = readable_post(&ctx, &auth.account, id).await?;
    authz::ensure_modifiable(&auth.account, &post)?;
    if full && req.content.is_none() {
        return Err(ApiError::invalid_field("content", "This field is required."));
    }
    req.validate()?;

    ctx.posts.update(&post, &req).await?;
    let view = load_view(&ctx, &auth.account, post.id).await?;

    Ok(Json(WithMessage {
        message: "Post updated successfully",
        data: view,
    }))
}

async fn delete_post(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let post = readable_post(&ctx, &auth.account, id).await?;
    authz::ensure_modifiable(&auth.account, &post)?;

    // Rows cascade with the post; files are removed afterwards
    let media = ctx.media.list_for_post(post.id).await?;
    ctx.posts.delete(post.id).await?;
    ctx.media.remove_files(&media).await;

    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> ApiResult<Json<LikeToggle>> {
    let post = readable_post(&ctx, &auth.account, id).await?;
    let (liked, likes_count) = ctx.posts.toggle_like(post.id, auth.account_id()).await?;

    Ok(Json(LikeToggle {
        liked,
        likes_count,
        message: if liked { "Post liked" } else { "Like removed" },
    }))
}
