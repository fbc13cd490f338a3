/// Row models for the Agora database
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account record
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub username: Option<String>,
    /// None for social-only accounts
    pub password_hash: Option<String>,
    pub email_verified: bool,
    pub is_active: bool,
    pub is_staff: bool,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn has_usable_password(&self) -> bool {
        self.password_hash.is_some()
    }
}

/// Profile record (one per account)
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Profile {
    #[serde(skip)]
    pub account_id: i64,
    pub display_name: String,
    pub bio: String,
    pub avatar: Option<String>,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub updated_at: DateTime<Utc>,
}

/// Social identity linking a provider account to a local account
#[derive(Debug, Clone, FromRow)]
pub struct SocialIdentity {
    pub id: i64,
    pub account_id: i64,
    pub provider: String,
    pub provider_user_id: String,
    pub extra_data: String,
    pub created_at: DateTime<Utc>,
}

/// Refresh token ledger entry
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub jti: String,
    pub account_id: i64,
    /// Unix seconds
    pub issued_at: i64,
    pub expires_at: i64,
    pub revoked_at: Option<i64>,
}

/// Post visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Privacy {
    #[default]
    Public,
    Private,
}

/// Post record
#[derive(Debug, Clone, FromRow)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
    pub privacy: Privacy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Tag record
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
}

/// Comment record
#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub author_id: i64,
    pub parent_id: Option<i64>,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Media record
#[derive(Debug, Clone, FromRow)]
pub struct Media {
    pub id: i64,
    pub post_id: i64,
    pub uploaded_by: i64,
    /// Path relative to the media root
    pub file_path: String,
    pub content_type: String,
    pub size: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub created_at: DateTime<Utc>,
}
