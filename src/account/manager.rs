/// Account manager: the credential store
///
/// Uses sqlx runtime queries so no DATABASE_URL is needed at compile time.

use crate::{
    account::{
        default_display_name, normalize_email, password::password_problems, PasswordHasher,
        RegisterRequest, UpdateProfileRequest,
    },
    db::{
        self,
        models::{Account, Profile},
    },
    error::{ApiError, ApiResult, FieldErrors},
};
use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";

/// Fields for a new account row
pub(crate) struct NewAccount<'a> {
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub email_verified: bool,
}

/// Account manager service
pub struct AccountManager {
    db: SqlitePool,
    hasher: PasswordHasher,
}

impl AccountManager {
    /// Create a new account manager
    pub fn new(db: SqlitePool, hasher: PasswordHasher) -> Self {
        Self { db, hasher }
    }

    /// Register a new password account together with its profile
    pub async fn create_account(&self, request: &RegisterRequest) -> ApiResult<Account> {
        let email = normalize_email(&request.email);

        let mut fields = FieldErrors::new();
        let problems = password_problems(&request.password, &email);
        if !problems.is_empty() {
            fields.insert("password".to_string(), problems);
        }
        if let Some(confirm) = &request.password_confirm {
            if confirm != &request.password {
                fields.insert(
                    "password_confirm".to_string(),
                    vec!["Passwords don't match".to_string()],
                );
            }
        }
        if !fields.is_empty() {
            return Err(ApiError::Validation {
                message: "Invalid registration data".to_string(),
                fields,
            });
        }

        if self.get_by_email(&email).await?.is_some() {
            return Err(ApiError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(&request.password)?;
        let display_name = request
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_display_name(&email));

        let mut tx = self.db.begin().await?;
        let account = insert_account(
            &mut *tx,
            NewAccount {
                email: &email,
                password_hash: Some(&password_hash),
                email_verified: false,
            },
        )
        .await
        .map_err(|e| {
            if db::is_unique_violation(&e) {
                ApiError::Conflict("An account with this email already exists".to_string())
            } else {
                ApiError::Database(e)
            }
        })?;
        insert_profile(&mut *tx, account.id, &display_name, None).await?;
        tx.commit().await?;

        info!("Created account {} ({})", account.id, account.email);
        Ok(account)
    }

    /// Check email and password, returning the active account
    pub async fn authenticate(&self, email: &str, password: &str) -> ApiResult<Account> {
        let email = normalize_email(email);
        let account = match self.get_by_email(&email).await? {
            Some(account) => account,
            None => {
                debug!("Login failed: unknown email");
                return Err(ApiError::InvalidCredentials(INVALID_CREDENTIALS.to_string()));
            }
        };

        let Some(hash) = account.password_hash.as_deref() else {
            debug!("Login failed: account {} has no usable password", account.id);
            return Err(ApiError::InvalidCredentials(INVALID_CREDENTIALS.to_string()));
        };

        if !self.hasher.verify(password, hash)? {
            debug!("Login failed: wrong password for account {}", account.id);
            return Err(ApiError::InvalidCredentials(INVALID_CREDENTIALS.to_string()));
        }

        if !account.is_active {
            debug!("Login failed: account {} is inactive", account.id);
            return Err(ApiError::InvalidCredentials(INVALID_CREDENTIALS.to_string()));
        }

        Ok(account)
    }

    /// Get account by id
    pub async fn get_account(&self, id: i64) -> ApiResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM account WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }

    /// Get account by email (case-insensitive)
    pub async fn get_by_email(&self, email: &str) -> ApiResult<Option<Account>> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM account WHERE email = ?1")
            .bind(email.trim())
            .fetch_optional(&self.db)
            .await?;
        Ok(account)
    }

    /// Get an account's profile
    pub async fn get_profile(&self, account_id: i64) -> ApiResult<Option<Profile>> {
        let profile =
            sqlx::query_as::<_, Profile>("SELECT * FROM profile WHERE account_id = ?1")
                .bind(account_id)
                .fetch_optional(&self.db)
                .await?;
        Ok(profile)
    }

    /// Apply a partial profile update for the owner
    pub async fn update_profile(
        &self,
        account_id: i64,
        update: &UpdateProfileRequest,
    ) -> ApiResult<Profile> {
        let current = self
            .get_profile(account_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

        let display_name = update
            .display_name
            .clone()
            .unwrap_or(current.display_name);
        let bio = update.bio.clone().unwrap_or(current.bio);
        let avatar = match &update.avatar {
            Some(avatar) if avatar.is_empty() => None,
            Some(avatar) => Some(avatar.clone()),
            None => current.avatar,
        };

        let profile = sqlx::query_as::<_, Profile>(
            "UPDATE profile SET display_name = ?1, bio = ?2, avatar = ?3, updated_at = ?4
             WHERE account_id = ?5
             RETURNING *",
        )
        .bind(&display_name)
        .bind(&bio)
        .bind(&avatar)
        .bind(Utc::now())
        .bind(account_id)
        .fetch_one(&self.db)
        .await?;

        debug!("Updated profile for account {}", account_id);
        Ok(profile)
    }

    /// Set the active flag
    pub async fn set_active(&self, account_id: i64, active: bool) -> ApiResult<()> {
        sqlx::query("UPDATE account SET is_active = ?1 WHERE id = ?2")
            .bind(active)
            .bind(account_id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// Insert an account row inside a caller-owned transaction
pub(crate) async fn insert_account(
    conn: &mut SqliteConnection,
    new: NewAccount<'_>,
) -> Result<Account, sqlx::Error> {
    sqlx::query_as::<_, Account>(
        "INSERT INTO account (email, password_hash, email_verified, is_active, is_staff, created_at)
         VALUES (?1, ?2, ?3, 1, 0, ?4)
         RETURNING *",
    )
    .bind(new.email)
    .bind(new.password_hash)
    .bind(new.email_verified)
    .bind(Utc::now())
    .fetch_one(conn)
    .await
}

/// Insert the profile row that accompanies every account
pub(crate) async fn insert_profile(
    conn: &mut SqliteConnection,
    account_id: i64,
    display_name: &str,
    avatar: Option<&str>,
) -> Result<Profile, sqlx::Error> {
    let now = Utc::now();
    sqlx::query_as::<_, Profile>(
        "INSERT INTO profile (account_id, display_name, bio, avatar, created_at, updated_at)
         VALUES (?1, ?2, '', ?3, ?4, ?4)
         RETURNING *",
    )
    .bind(account_id)
    .bind(display_name)
    .bind(avatar)
    .bind(now)
    .fetch_one(conn)
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;

    async fn manager() -> AccountManager {
        let pool = db::create_memory_pool().await.unwrap();
        let mut auth = ServerConfig::default().authentication;
        auth.argon2_memory_kib = 64;
        auth.argon2_iterations = 1;
        AccountManager::new(pool, PasswordHasher::new(&auth).unwrap())
    }

    fn register(email: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "s3cure-password".to_string(),
            password_confirm: Some("s3cure-password".to_string()),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_create_account_creates_profile() {
        let manager = manager().await;
        let account = manager.create_account(&register("alice@example.com")).await.unwrap();

        let profile = manager.get_profile(account.id).await.unwrap().unwrap();
        assert_eq!(profile.display_name, "alice");
        assert!(account.has_usable_password());
        assert!(account.is_active);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_conflict_case_insensitive() {
        let manager = manager().await;
        manager.create_account(&register("alice@example.com")).await.unwrap();

        let err = manager
            .create_account(&register("ALICE@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_password_mismatch_is_field_error() {
        let manager = manager().await;
        let mut request = register("alice@example.com");
        request.password_confirm = Some("different-password".to_string());

        match manager.create_account(&request).await.unwrap_err() {
            ApiError::Validation { fields, .. } => {
                assert!(fields.contains_key("password_confirm"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_authenticate() {
        let manager = manager().await;
        let account = manager.create_account(&register("alice@example.com")).await.unwrap();

        let found = manager
            .authenticate("Alice@Example.com", "s3cure-password")
            .await
            .unwrap();
        assert_eq!(found.id, account.id);

        let err = manager
            .authenticate("alice@example.com", "wrong-password")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials(_)));

        manager.set_active(account.id, false).await.unwrap();
        let err = manager
            .authenticate("alice@example.com", "s3cure-password")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn test_update_profile_is_partial() {
        let manager = manager().await;
        let account = manager.create_account(&register("alice@example.com")).await.unwrap();

        let profile = manager
            .update_profile(
                account.id,
                &UpdateProfileRequest {
                    bio: Some("hello".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(profile.bio, "hello");
        assert_eq!(profile.display_name, "alice");
    }
}
