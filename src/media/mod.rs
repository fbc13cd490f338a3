/// Media attachments for posts
///
/// Uploads are validated (size, content type, image integrity), written
/// through a `MediaBackend`, and recorded in the `media` table.

mod disk;

pub use disk::DiskMediaBackend;

use crate::{
    config::MediaConfig,
    db::models::Media,
    error::{ApiError, ApiResult},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::ImageReader;
use serde::Serialize;
use sqlx::SqlitePool;
use std::{io::Cursor, sync::Arc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Storage for media bytes, addressed by relative path
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn put(&self, path: &str, data: &[u8]) -> ApiResult<()>;

    async fn get(&self, path: &str) -> ApiResult<Option<Vec<u8>>>;

    /// Delete; a missing file is not an error
    async fn delete(&self, path: &str) -> ApiResult<()>;
}

/// One uploaded file as received from a multipart body
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

/// Metadata derived during validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaMetadata {
    pub content_type: String,
    pub size: usize,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Check an upload against the media policy
pub fn validate(config: &MediaConfig, upload: &MediaUpload) -> ApiResult<MediaMetadata> {
    let size = upload.data.len();
    let content_type = upload.content_type.trim().to_ascii_lowercase();

    if size == 0 {
        return Err(ApiError::invalid_field(
            "file",
            "Empty file upload is not allowed",
        ));
    }
    if size > config.max_file_size {
        return Err(ApiError::invalid_field(
            "file",
            format!("File exceeds maximum size of {} bytes", config.max_file_size),
        ));
    }
    if !config.allowed_content_types.is_empty()
        && !config
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&content_type))
    {
        return Err(ApiError::invalid_field(
            "file",
            format!("Unsupported content type: {}", content_type),
        ));
    }

    let (width, height) = if content_type.starts_with("image/") {
        match image_dimensions(&upload.data) {
            Ok((width, height)) => (Some(width), Some(height)),
            Err(e) => {
                debug!("Rejecting {}: {}", upload.filename, e);
                return Err(ApiError::invalid_field("file", "Invalid image file"));
            }
        }
    } else {
        (None, None)
    };

    Ok(MediaMetadata {
        content_type,
        size,
        width,
        height,
    })
}

/// Width and height from the image header, without decoding pixels
fn image_dimensions(data: &[u8]) -> image::ImageResult<(u32, u32)> {
    ImageReader::new(Cursor::new(data))
        .with_guessed_format()?
        .into_dimensions()
}

/// Reduce a client filename to a safe single path segment
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    let truncated: String = cleaned.chars().take(100).collect();

    if truncated.is_empty() {
        "upload".to_string()
    } else {
        truncated
    }
}

/// Media as returned by the API
#[derive(Debug, Clone, Serialize)]
pub struct MediaView {
    pub id: i64,
    pub post: i64,
    pub file: String,
    pub content_type: String,
    pub size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub uploaded_by: i64,
    pub created_at: DateTime<Utc>,
}

/// Media manager service
pub struct MediaManager {
    db: SqlitePool,
    backend: Arc<dyn MediaBackend>,
    config: MediaConfig,
    /// Public URL plus API prefix; file routes hang off it
    url_base: String,
}

impl MediaManager {
    pub fn new(
        db: SqlitePool,
        backend: Arc<dyn MediaBackend>,
        config: MediaConfig,
        public_url: Option<&str>,
        api_prefix: &str,
    ) -> Self {
        let url_base = format!(
            "{}{}",
            public_url.unwrap_or("").trim_end_matches('/'),
            api_prefix.trim_end_matches('/')
        );
        Self {
            db,
            backend,
            config,
            url_base,
        }
    }

    pub fn view(&self, media: &Media) -> MediaView {
        MediaView {
            id: media.id,
            post: media.post_id,
            file: format!(
                "{}/posts/{}/media/{}/file",
                self.url_base, media.post_id, media.id
            ),
            content_type: media.content_type.clone(),
            size: media.size,
            width: media.width,
            height: media.height,
            uploaded_by: media.uploaded_by,
            created_at: media.created_at,
        }
    }

    /// Validate, store and record one upload
    pub async fn upload(
        &self,
        post_id: i64,
        uploader_id: i64,
        upload: &MediaUpload,
    ) -> ApiResult<Media> {
        let meta = validate(&self.config, upload)?;

        let path = format!(
            "posts/{}/{}-{}",
            post_id,
            Uuid::new_v4().simple(),
            sanitize_filename(&upload.filename)
        );
        self.backend.put(&path, &upload.data).await?;

        let inserted = sqlx::query_as::<_, Media>(
            "INSERT INTO media (post_id, uploaded_by, file_path, content_type, size, width, height, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             RETURNING *",
        )
        .bind(post_id)
        .bind(uploader_id)
        .bind(&path)
        .bind(&meta.content_type)
        .bind(meta.size as i64)
        .bind(meta.width.map(i64::from))
        .bind(meta.height.map(i64::from))
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await;

        match inserted {
            Ok(media) => {
                info!(
                    "Stored media {} for post {} ({}, {} bytes)",
                    media.id, post_id, media.content_type, media.size
                );
                Ok(media)
            }
            Err(e) => {
                if let Err(cleanup) = self.backend.delete(&path).await {
                    warn!("Failed to remove orphaned media file {}: {}", path, cleanup);
                }
                Err(e.into())
            }
        }
    }

    /// Media row scoped to its post
    pub async fn get(&self, post_id: i64, media_id: i64) -> ApiResult<Option<Media>> {
        let media = sqlx::query_as::<_, Media>("SELECT * FROM media WHERE id = ?1 AND post_id = ?2")
            .bind(media_id)
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(media)
    }

    /// Stored bytes for a media row
    pub async fn read(&self, media: &Media) -> ApiResult<Vec<u8>> {
        match self.backend.get(&media.file_path).await? {
            Some(data) => Ok(data),
            None => {
                warn!("Media {} has no stored file at {}", media.id, media.file_path);
                Err(ApiError::NotFound("Media not found".to_string()))
            }
        }
    }

    pub async fn list_for_post(&self, post_id: i64) -> ApiResult<Vec<Media>> {
        let media = sqlx::query_as::<_, Media>("SELECT * FROM media WHERE post_id = ?1 ORDER BY id")
            .bind(post_id)
            .fetch_all(&self.db)
            .await?;
        Ok(media)
    }

    /// Delete a media row and its file
    pub async fn delete(&self, media: &Media) -> ApiResult<()> {
        sqlx::query("DELETE FROM media WHERE id = ?1")
            .bind(media.id)
            .execute(&self.db)
            .await?;
        self.remove_files(std::slice::from_ref(media)).await;
        info!("Deleted media {} from post {}", media.id, media.post_id);
        Ok(())
    }

    /// Best-effort removal of stored files whose rows are already gone
    pub async fn remove_files(&self, media: &[Media]) {
        for item in media {
            if let Err(e) = self.backend.delete(&item.file_path).await {
                warn!("Failed to remove media file {}: {}", item.file_path, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::new(width, height);
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, image::ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn upload(content_type: &str, data: Vec<u8>) -> MediaUpload {
        MediaUpload {
            filename: "photo.png".to_string(),
            content_type: content_type.to_string(),
            data,
        }
    }

    #[test]
    fn test_valid_image_records_dimensions() {
        let config = ServerConfig::default().media;
        let meta = validate(&config, &upload("image/png", png_bytes(4, 3))).unwrap();

        assert_eq!(meta.width, Some(4));
        assert_eq!(meta.height, Some(3));
        assert_eq!(meta.content_type, "image/png");
    }

    #[test]
    fn test_rejections() {
        let mut config = ServerConfig::default().media;
        config.max_file_size = 16;

        let empty = validate(&config, &upload("text/plain", Vec::new())).unwrap_err();
        assert!(empty.to_string().contains("Empty file"));

        let big = validate(&config, &upload("text/plain", vec![b'a'; 17])).unwrap_err();
        assert!(big.to_string().contains("maximum size"));

        let binary =
            validate(&config, &upload("application/octet-stream", vec![1, 2, 3])).unwrap_err();
        assert!(binary.to_string().contains("Unsupported content type"));

        let fake_image = validate(&config, &upload("image/png", b"not a png".to_vec())).unwrap_err();
        assert_eq!(fake_image.to_string(), "Invalid image file");
    }

    #[test]
    fn test_large_image_dimensions_come_from_header() {
        let config = ServerConfig::default().media;
        let data = png_bytes(2000, 1500);
        assert!(data.len() < config.max_file_size);

        let meta = validate(&config, &upload("image/png", data)).unwrap();
        assert_eq!((meta.width, meta.height), (Some(2000), Some(1500)));
    }

    #[test]
    fn test_text_upload_has_no_dimensions() {
        let config = ServerConfig::default().media;
        let meta = validate(&config, &upload("text/plain", b"hello".to_vec())).unwrap();
        assert_eq!(meta.width, None);
        assert_eq!(meta.size, 5);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("my photo (1).jpg"), "my_photo__1_.jpg");
        assert_eq!(sanitize_filename("C:\\Users\\x\\pic.png"), "pic.png");
        assert_eq!(sanitize_filename(""), "upload");
        assert_eq!(sanitize_filename(".hidden"), "hidden");
    }
}
