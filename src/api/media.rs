/// Media endpoints, nested under a post
use crate::{
    api::posts::readable_post,
    auth::AuthContext,
    authz::{self, PostMedia},
    context::AppContext,
    db::models::{Account, Media, Post},
    error::{ApiError, ApiResult},
    media::{MediaUpload, MediaView},
};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::WithRejection;
use serde::Serialize;

/// Build media routes with a body limit sized for uploads
pub fn routes(max_request_size: usize) -> Router<AppContext> {
    Router::new()
        .route("/posts/:id/media", post(upload_media))
        .route("/posts/:id/media/batch", post(upload_batch))
        .route(
            "/posts/:id/media/:media_id",
            get(get_media).delete(delete_media),
        )
        .route("/posts/:id/media/:media_id/file", get(get_media_file))
        .layer(DefaultBodyLimit::max(max_request_size))
}

#[derive(Debug, Serialize)]
pub struct BatchError {
    pub filename: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub created: Vec<MediaView>,
    pub errors: Vec<BatchError>,
}

/// Collect every file part whose field name is `field`
async fn read_files(multipart: &mut Multipart, field: &str) -> ApiResult<Vec<MediaUpload>> {
    let mut uploads = Vec::new();

    while let Some(part) = multipart.next_field().await? {
        if part.name() != Some(field) {
            continue;
        }
        let filename = part.file_name().unwrap_or("upload").to_string();
        let content_type = part
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = part.bytes().await?.to_vec();

        uploads.push(MediaUpload {
            filename,
            content_type,
            data,
        });
    }

    Ok(uploads)
}

/// Post the account may read and attach media to
async fn owned_post(ctx: &AppContext, account: &Account, post_id: i64) -> ApiResult<Post> {
    let post = readable_post(ctx, account, post_id).await?;
    authz::ensure_modifiable(account, &post)?;
    Ok(post)
}

/// Media the account may see; everything else is NotFound
async fn visible_media(
    ctx: &AppContext,
    account: &Account,
    post_id: i64,
    media_id: i64,
) -> ApiResult<(Post, Media)> {
    let post = readable_post(ctx, account, post_id).await?;
    let media = ctx
        .media
        .get(post.id, media_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Media not found".to_string()))?;
    authz::ensure_readable(
        account,
        &PostMedia {
            post: &post,
            media: &media,
        },
        "Media",
    )?;
    Ok((post, media))
}

async fn upload_media(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(post_id): Path<i64>,
    WithRejection(mut multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<(StatusCode, Json<MediaView>)> {
    let post = owned_post(&ctx, &auth.account, post_id).await?;

    let upload = read_files(&mut multipart, "file")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::invalid_field("file", "No file was submitted."))?;

    let media = ctx.media.upload(post.id, auth.account_id(), &upload).await?;
    Ok((StatusCode::CREATED, Json(ctx.media.view(&media))))
}

async fn upload_batch(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path(post_id): Path<i64>,
    WithRejection(mut multipart, _): WithRejection<Multipart, ApiError>,
) -> ApiResult<(StatusCode, Json<BatchResponse>)> {
    let post = owned_post(&ctx, &auth.account, post_id).await?;

    let uploads = read_files(&mut multipart, "files").await?;
    if uploads.is_empty() {
        return Err(ApiError::invalid_field("files", "No files provided"));
    }

    let mut created = Vec::new();
    let mut errors = Vec::new();
    for upload in &uploads {
        match ctx.media.upload(post.id, auth.account_id(), upload).await {
            Ok(media) => created.push(ctx.media.view(&media)),
            Err(e) => {
                tracing::debug!("Batch upload rejected {}: {}", upload.filename, e);
                errors.push(BatchError {
                    filename: upload.filename.clone(),
                    error: client_message(&e),
                });
            }
        }
    }

    let status = if errors.is_empty() {
        StatusCode::CREATED
    } else {
        StatusCode::MULTI_STATUS
    };
    Ok((status, Json(BatchResponse { created, errors })))
}

/// Per-file message safe to return to the client
fn client_message(err: &ApiError) -> String {
    match err {
        ApiError::Database(_) | ApiError::Io(_) | ApiError::Internal(_) => {
            tracing::error!("Media upload failed: {}", err);
            "Internal server error".to_string()
        }
        other => other.to_string(),
    }
}

async fn get_media(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, media_id)): Path<(i64, i64)>,
) -> ApiResult<Json<MediaView>> {
    let (_, media) = visible_media(&ctx, &auth.account, post_id, media_id).await?;
    Ok(Json(ctx.media.view(&media)))
}

/// Stored bytes, behind the same visibility check as the metadata
async fn get_media_file(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, media_id)): Path<(i64, i64)>,
) -> ApiResult<Response> {
    let (_, media) = visible_media(&ctx, &auth.account, post_id, media_id).await?;
    let data = ctx.media.read(&media).await?;

    let content_type = HeaderValue::from_str(&media.content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (header::CACHE_CONTROL, HeaderValue::from_static("private, no-store")),
        ],
        data,
    )
        .into_response())
}

async fn delete_media(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Path((post_id, media_id)): Path<(i64, i64)>,
) -> ApiResult<StatusCode> {
    let (post, media) = visible_media(&ctx, &auth.account, post_id, media_id).await?;
    authz::ensure_modifiable(
        &auth.account,
        &PostMedia {
            post: &post,
            media: &media,
        },
    )?;

    ctx.media.delete(&media).await?;
    Ok(StatusCode::NO_CONTENT)
}
