/// Posts, tags, likes and comments

mod comments;
mod manager;

pub use comments::{CommentManager, CommentRow};
pub use manager::{PostManager, PostRow};

use crate::db::models::{Privacy, Tag};
use crate::media::MediaView;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Tags are accepted either as plain names or as `{"name": ...}` objects
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum TagInput {
    Name(String),
    Object { name: String },
}

impl TagInput {
    pub fn name(&self) -> &str {
        match self {
            TagInput::Name(name) | TagInput::Object { name } => name,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePostRequest {
    #[serde(default)]
    #[validate(length(max = 200, message = "Ensure this field has no more than 200 characters."))]
    pub title: String,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub content: String,
    #[serde(default)]
    pub privacy: Privacy,
    #[serde(default)]
    pub tags: Vec<TagInput>,
}

/// Post update; PUT requires `content`, PATCH accepts any subset
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePostRequest {
    #[validate(length(max = 200, message = "Ensure this field has no more than 200 characters."))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub content: Option<String>,
    pub privacy: Option<Privacy>,
    pub tags: Option<Vec<TagInput>>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment text must be 1 to 5000 characters."))]
    pub text: String,
    pub parent: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment text must be 1 to 5000 characters."))]
    pub text: Option<String>,
}

/// limit/offset query parameters
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct Pagination {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl Pagination {
    /// Clamp to `1..=MAX_PAGE_SIZE` and a non-negative offset
    pub fn normalized(&self) -> (i64, i64) {
        let limit = self
            .limit
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        let offset = self.offset.unwrap_or(0).max(0);
        (limit, offset)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthorView {
    pub id: i64,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PostView {
    pub id: i64,
    pub author: AuthorView,
    pub title: String,
    pub content: String,
    pub privacy: Privacy,
    pub tags: Vec<Tag>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub media: Vec<MediaView>,
    pub likes_count: i64,
    pub comments_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CommentView {
    pub id: i64,
    pub post: i64,
    pub author: AuthorView,
    pub text: String,
    pub parent: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub replies_count: i64,
}

impl From<CommentRow> for CommentView {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.comment.id,
            post: row.comment.post_id,
            author: AuthorView {
                id: row.comment.author_id,
                email: row.author_email,
            },
            text: row.comment.text,
            parent: row.comment.parent_id,
            created_at: row.comment.created_at,
            replies_count: row.replies_count,
        }
    }
}

/// Paginated list envelope
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub limit: i64,
    pub offset: i64,
    pub results: Vec<T>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LikeToggle {
    pub liked: bool,
    pub likes_count: i64,
    pub message: &'static str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_clamps() {
        assert_eq!(Pagination::default().normalized(), (20, 0));
        assert_eq!(
            Pagination {
                limit: Some(1000),
                offset: Some(-5)
            }
            .normalized(),
            (100, 0)
        );
        assert_eq!(
            Pagination {
                limit: Some(0),
                offset: Some(40)
            }
            .normalized(),
            (1, 40)
        );
    }

    #[test]
    fn test_tag_input_accepts_both_shapes() {
        let tags: Vec<TagInput> =
            serde_json::from_str(r#"["rust", {"name": "axum"}]"#).unwrap();
        let names: Vec<&str> = tags.iter().map(TagInput::name).collect();
        assert_eq!(names, vec!["rust", "axum"]);
    }

    #[test]
    fn test_privacy_defaults_to_public() {
        let request: CreatePostRequest = serde_json::from_str(r#"{"content": "hi"}"#).unwrap();
        assert_eq!(request.privacy, Privacy::Public);
        assert!(request.tags.is_empty());
    }
}
