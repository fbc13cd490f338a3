/// Post manager
use crate::{
    db::models::{Post, Tag},
    error::{ApiError, ApiResult, FieldErrors},
    post::{CreatePostRequest, TagInput, UpdatePostRequest},
};
use chrono::Utc;
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};

const MAX_TAG_LENGTH: usize = 100;

const POST_ROW_SELECT: &str = "SELECT p.*, a.email AS author_email,
        (SELECT COUNT(*) FROM post_like l WHERE l.post_id = p.id) AS likes_count,
        (SELECT COUNT(*) FROM comment c WHERE c.post_id = p.id) AS comments_count
     FROM post p JOIN account a ON a.id = p.author_id";

/// Post with its author email and counters
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    #[sqlx(flatten)]
    pub post: Post,
    pub author_email: String,
    pub likes_count: i64,
    pub comments_count: i64,
}

pub struct PostManager {
    db: SqlitePool,
}

impl PostManager {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(&self, author_id: i64, request: &CreatePostRequest) -> ApiResult<Post> {
        if request.content.trim().is_empty() {
            return Err(ApiError::invalid_field("content", "This field may not be blank."));
        }
        let tags = clean_tags(&request.tags)?;
        let now = Utc::now();

        let mut tx = self.db.begin().await?;
        let post = sqlx::query_as::<_, Post>(
            "INSERT INTO post (author_id, title, content, privacy, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             RETURNING *",
        )
        .bind(author_id)
        .bind(request.title.trim())
        .bind(&request.content)
        .bind(request.privacy)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        set_tags(&mut *tx, post.id, &tags).await?;
        tx.commit().await?;

        info!("Account {} created post {}", author_id, post.id);
        Ok(post)
    }

    pub async fn get(&self, post_id: i64) -> ApiResult<Option<Post>> {
        let post = sqlx::query_as::<_, Post>("SELECT * FROM post WHERE id = ?1")
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(post)
    }

    pub async fn get_row(&self, post_id: i64) -> ApiResult<Option<PostRow>> {
        let row = sqlx::query_as::<_, PostRow>(&format!("{} WHERE p.id = ?1", POST_ROW_SELECT))
            .bind(post_id)
            .fetch_optional(&self.db)
            .await?;
        Ok(row)
    }

    /// Public posts plus the viewer's own, newest first
    pub async fn list_visible(
        &self,
        viewer_id: i64,
        limit: i64,
        offset: i64,
    ) -> ApiResult<(Vec<PostRow>, i64)> {
        let rows = sqlx::query_as::<_, PostRow>(&format!(
            "{} WHERE p.privacy = 'public' OR p.author_id = ?1
             ORDER BY p.created_at DESC, p.id DESC
             LIMIT ?2 OFFSET ?3",
            POST_ROW_SELECT
        ))
        .bind(viewer_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM post WHERE privacy = 'public' OR author_id = ?1",
        )
        .bind(viewer_id)
        .fetch_one(&self.db)
        .await?;

        Ok((rows, count))
    }

    /// Apply an update; fields left as None keep their value
    pub async fn update(&self, post: &Post, request: &UpdatePostRequest) -> ApiResult<Post> {
        if let Some(content) = &request.content {
            if content.trim().is_empty() {
                return Err(ApiError::invalid_field("content", "This field may not be blank."));
            }
        }
        let tags = request.tags.as_deref().map(clean_tags).transpose()?;

        let title = request
            .title
            .as_deref()
            .map(str::trim)
            .unwrap_or(&post.title);
        let content = request.content.as_deref().unwrap_or(&post.content);
        let privacy = request.privacy.unwrap_or(post.privacy);

        let mut tx = self.db.begin().await?;
        let updated = sqlx::query_as::<_, Post>(
            "UPDATE post SET title = ?1, content = ?2, privacy = ?3, updated_at = ?4
             WHERE id = ?5
             RETURNING *",
        )
        .bind(title)
        .bind(content)
        .bind(privacy)
        .bind(Utc::now())
        .bind(post.id)
        .fetch_one(&mut *tx)
        .await?;
        if let Some(tags) = &tags {
            sqlx::query("DELETE FROM post_tag WHERE post_id = ?1")
                .bind(post.id)
                .execute(&mut *tx)
                .await?;
            set_tags(&mut *tx, post.id, tags).await?;
        }
        tx.commit().await?;

        debug!("Updated post {}", post.id);
        Ok(updated)
    }

    /// Delete a post; comments, likes, tag links and media rows cascade
    pub async fn delete(&self, post_id: i64) -> ApiResult<()> {
        sqlx::query("DELETE FROM post WHERE id = ?1")
            .bind(post_id)
            .execute(&self.db)
            .await?;
        info!("Deleted post {}", post_id);
        Ok(())
    }

    pub async fn tags_for(&self, post_id: i64) -> ApiResult<Vec<Tag>> {
        let tags = sqlx::query_as::<_, Tag>(
            "SELECT t.id, t.name FROM tag t
             JOIN post_tag pt ON pt.tag_id = t.id
             WHERE pt.post_id = ?1
             ORDER BY t.name",
        )
        .bind(post_id)
        .fetch_all(&self.db)
        .await?;
        Ok(tags)
    }

    /// Like if not liked, unlike otherwise. Returns (liked, likes_count)
    pub async fn toggle_like(&self, post_id: i64, account_id: i64) -> ApiResult<(bool, i64)> {
        let mut tx = self.db.begin().await?;

        let removed = sqlx::query("DELETE FROM post_like WHERE post_id = ?1 AND account_id = ?2")
            .bind(post_id)
            .bind(account_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let liked = if removed == 0 {
            sqlx::query(
                "INSERT INTO post_like (post_id, account_id, created_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(post_id, account_id) DO NOTHING",
            )
            .bind(post_id)
            .bind(account_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
            true
        } else {
            false
        };

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_like WHERE post_id = ?1")
            .bind(post_id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok((liked, count))
    }
}

/// Trim, dedupe and check tag names
fn clean_tags(tags: &[TagInput]) -> ApiResult<Vec<String>> {
    let mut names: Vec<String> = Vec::new();
    for tag in tags {
        let name = tag.name().trim();
        if name.is_empty() || name.chars().count() > MAX_TAG_LENGTH {
            let mut fields = FieldErrors::new();
            fields.insert(
                "tags".to_string(),
                vec![format!("Tag names must be 1 to {} characters.", MAX_TAG_LENGTH)],
            );
            return Err(ApiError::Validation {
                message: "Invalid tag".to_string(),
                fields,
            });
        }
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    Ok(names)
}

/// Get-or-create each tag and link it to the post
async fn set_tags(conn: &mut SqliteConnection, post_id: i64, names: &[String]) -> ApiResult<()> {
    for name in names {
        sqlx::query("INSERT INTO tag (name) VALUES (?1) ON CONFLICT(name) DO NOTHING")
            .bind(name)
            .execute(&mut *conn)
            .await?;
        sqlx::query(
            "INSERT INTO post_tag (post_id, tag_id)
             SELECT ?1, id FROM tag WHERE name = ?2
             ON CONFLICT(post_id, tag_id) DO NOTHING",
        )
        .bind(post_id)
        .bind(name)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db, db::models::Privacy};

    async fn setup() -> (PostManager, SqlitePool, i64, i64) {
        let pool = db::create_memory_pool().await.unwrap();
        let mut ids = Vec::new();
        for email in ["alice@example.com", "bob@example.com"] {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO account (email, created_at) VALUES (?1, ?2) RETURNING id",
            )
            .bind(email)
            .bind(Utc::now())
            .fetch_one(&pool)
            .await
            .unwrap();
            ids.push(id);
        }
        (PostManager::new(pool.clone()), pool, ids[0], ids[1])
    }

    fn request(content: &str, privacy: Privacy, tags: &[&str]) -> CreatePostRequest {
        CreatePostRequest {
            title: "Title".to_string(),
            content: content.to_string(),
            privacy,
            tags: tags.iter().map(|t| TagInput::Name(t.to_string())).collect(),
        }
    }

    #[tokio::test]
    async fn test_create_with_tags() {
        let (posts, _, alice, _) = setup().await;
        let post = posts
            .create(alice, &request("hello", Privacy::Public, &["rust", "rust", "axum"]))
            .await
            .unwrap();

        let names: Vec<String> = posts
            .tags_for(post.id)
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["axum", "rust"]);
    }

    #[tokio::test]
    async fn test_blank_content_rejected() {
        let (posts, _, alice, _) = setup().await;
        let err = posts
            .create(alice, &request("   ", Privacy::Public, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_list_visible_hides_others_private_posts() {
        let (posts, _, alice, bob) = setup().await;
        posts.create(alice, &request("public", Privacy::Public, &[])).await.unwrap();
        posts.create(alice, &request("secret", Privacy::Private, &[])).await.unwrap();
        posts.create(bob, &request("bob's", Privacy::Private, &[])).await.unwrap();

        let (rows, count) = posts.list_visible(bob, 20, 0).await.unwrap();
        assert_eq!(count, 2);
        let contents: Vec<&str> = rows.iter().map(|r| r.post.content.as_str()).collect();
        assert!(contents.contains(&"public"));
        assert!(contents.contains(&"bob's"));
        assert!(!contents.contains(&"secret"));

        let (_, alice_count) = posts.list_visible(alice, 20, 0).await.unwrap();
        assert_eq!(alice_count, 2);
    }

    #[tokio::test]
    async fn test_partial_update_and_tag_replacement() {
        let (posts, _, alice, _) = setup().await;
        let post = posts
            .create(alice, &request("hello", Privacy::Public, &["old"]))
            .await
            .unwrap();

        let updated = posts
            .update(
                &post,
                &UpdatePostRequest {
                    privacy: Some(Privacy::Private),
                    tags: Some(vec![TagInput::Object {
                        name: "new".to_string(),
                    }]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.privacy, Privacy::Private);
        assert_eq!(updated.content, "hello");
        let tags = posts.tags_for(post.id).await.unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].name, "new");
    }

    #[tokio::test]
    async fn test_like_toggle() {
        let (posts, _, alice, bob) = setup().await;
        let post = posts.create(alice, &request("hello", Privacy::Public, &[])).await.unwrap();

        assert_eq!(posts.toggle_like(post.id, bob).await.unwrap(), (true, 1));
        assert_eq!(posts.toggle_like(post.id, alice).await.unwrap(), (true, 2));
        assert_eq!(posts.toggle_like(post.id, bob).await.unwrap(), (false, 1));

        let row = posts.get_row(post.id).await.unwrap().unwrap();
        assert_eq!(row.likes_count, 1);
        assert_eq!(row.author_email, "alice@example.com");
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let (posts, pool, alice, bob) = setup().await;
        let post = posts.create(alice, &request("hello", Privacy::Public, &["t"])).await.unwrap();
        posts.toggle_like(post.id, bob).await.unwrap();

        posts.delete(post.id).await.unwrap();

        assert!(posts.get(post.id).await.unwrap().is_none());
        let likes: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM post_like")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(likes, 0);
    }
}
