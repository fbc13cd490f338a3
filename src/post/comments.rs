/// Comments on posts, with optional single-parent threading
use crate::{
    db::models::Comment,
    error::{ApiError, ApiResult},
};
use chrono::Utc;
use sqlx::{FromRow, SqlitePool};
use tracing::debug;

const COMMENT_ROW_SELECT: &str = "SELECT c.*, a.email AS author_email,
        (SELECT COUNT(*) FROM comment r WHERE r.parent_id = c.id) AS replies_count
     FROM comment c JOIN account a ON a.id = c.author_id";

/// Comment with its author email and reply count
#[derive(Debug, Clone, FromRow)]
pub struct CommentRow {
    #[sqlx(flatten)]
    pub comment: Comment,
    pub author_email: String,
    pub replies_count: i64,
}

pub struct CommentManager {
    db: SqlitePool,
}

impl CommentManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// All comments on a post, oldest first
    pub async fn list(&self, post_id: i64) -> ApiResult<Vec<CommentRow>> {
        let rows = sqlx::query_as::<_, CommentRow>(&format!(
            "{} WHERE c.post_id = ?1 ORDER BY c.created_at, c.id",
            COMMENT_ROW_SELECT
        ))
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    /// Comment scoped to its post
    pub async fn get(&self, post_id: i64, comment_id: i64) -> ApiResult<Option<CommentRow>> {
        let row = sqlx::query_as::<_, CommentRow>(&format!(
            "{} WHERE c.id = ?1 AND c.post_id = ?2",
            COMMENT_ROW_SELECT
        ))
        .bind(comment_id)
        .bind(post_id)
        .fetch_optional(&self.db)
        .await?;
        Ok(row)
    }

    pub async fn create(
        &self,
        post_id: i64,
        author_id: i64,
        text: &str,
        parent_id: Option<i64>,
    ) -> ApiResult<CommentRow> {
        if text.trim().is_empty() {
            return Err(ApiError::invalid_field("text", "This field may not be blank."));
        }
        if let Some(parent_id) = parent_id {
            let parent_post: Option<i64> =
                sqlx::query_scalar("SELECT post_id FROM comment WHERE id = ?1")
                    .bind(parent_id)
                    .fetch_optional(&self.db)
                    .await?;
            if parent_post != Some(post_id) {
                return Err(ApiError::invalid_field(
                    "parent",
                    "Parent comment must belong to the same post.",
                ));
            }
        }

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO comment (post_id, author_id, parent_id, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id",
        )
        .bind(post_id)
        .bind(author_id)
        .bind(parent_id)
        .bind(text)
        .bind(Utc::now())
        .fetch_one(&self.db)
        .await?;

        debug!("Account {} commented on post {}", author_id, post_id);
        self.get(post_id, id)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("Comment {} vanished after insert", id)))
    }

    pub async fn update(&self, comment: &Comment, text: &str) -> ApiResult<CommentRow> {
        if text.trim().is_empty() {
            return Err(ApiError::invalid_field("text", "This field may not be blank."));
        }
        sqlx::query("UPDATE comment SET text = ?1 WHERE id = ?2")
            .bind(text)
            .bind(comment.id)
            .execute(&self.db)
            .await?;

        self.get(comment.post_id, comment.id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))
    }

    /// Delete a comment; replies cascade
    pub async fn delete(&self, comment: &Comment) -> ApiResult<()> {
        sqlx::query("DELETE FROM comment WHERE id = ?1")
            .bind(comment.id)
            .execute(&self.db)
            .await?;
        debug!("Deleted comment {} on post {}", comment.id, comment.post_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    async fn setup() -> (CommentManager, i64, i64, i64) {
        let pool = db::create_memory_pool().await.unwrap();
        let author: i64 = sqlx::query_scalar(
            "INSERT INTO account (email, created_at) VALUES ('carol@example.com', ?1) RETURNING id",
        )
        .bind(Utc::now())
        .fetch_one(&pool)
        .await
        .unwrap();

        let mut posts = Vec::new();
        for _ in 0..2 {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO post (author_id, content, created_at, updated_at)
                 VALUES (?1, 'body', ?2, ?2) RETURNING id",
            )
            .bind(author)
            .bind(Utc::now())
            .fetch_one(&pool)
            .await
            .unwrap();
            posts.push(id);
        }
        (CommentManager::new(pool), author, posts[0], posts[1])
    }

    #[tokio::test]
    async fn test_threaded_comments() {
        let (comments, author, post, _) = setup().await;

        let root = comments.create(post, author, "first", None).await.unwrap();
        comments
            .create(post, author, "reply", Some(root.comment.id))
            .await
            .unwrap();

        let rows = comments.list(post).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].replies_count, 1);
        assert_eq!(rows[0].author_email, "carol@example.com");
        assert_eq!(rows[1].comment.parent_id, Some(root.comment.id));
    }

    #[tokio::test]
    async fn test_parent_must_be_on_same_post() {
        let (comments, author, post, other_post) = setup().await;
        let root = comments.create(post, author, "first", None).await.unwrap();

        let err = comments
            .create(other_post, author, "cross", Some(root.comment.id))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));

        let missing = comments
            .create(post, author, "orphan", Some(9999))
            .await
            .unwrap_err();
        assert!(matches!(missing, ApiError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_update_and_delete_cascade() {
        let (comments, author, post, _) = setup().await;
        let root = comments.create(post, author, "first", None).await.unwrap();
        comments
            .create(post, author, "reply", Some(root.comment.id))
            .await
            .unwrap();

        let edited = comments.update(&root.comment, "edited").await.unwrap();
        assert_eq!(edited.comment.text, "edited");

        comments.delete(&root.comment).await.unwrap();
        assert!(comments.list(post).await.unwrap().is_empty());
        assert!(comments.get(post, root.comment.id).await.unwrap().is_none());
    }
}
