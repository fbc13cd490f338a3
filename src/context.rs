/// Application context and dependency injection
use crate::{
    account::{AccountManager, PasswordHasher},
    config::ServerConfig,
    db,
    error::{ApiError, ApiResult},
    media::{DiskMediaBackend, MediaManager},
    post::{CommentManager, PostManager},
    rate_limit::RateLimiter,
    social::{GoogleProvider, ProviderRegistry, SocialLinker},
    token::{TokenIssuer, TokenStore},
};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub accounts: Arc<AccountManager>,
    pub tokens: Arc<TokenIssuer>,
    pub social: Arc<SocialLinker>,
    pub posts: Arc<PostManager>,
    pub comments: Arc<CommentManager>,
    pub media: Arc<MediaManager>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> ApiResult<Self> {
        config.validate()?;

        Self::ensure_directories(&config).await?;

        let db = db::create_pool(&config.storage.database, db::DatabaseOptions::default()).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;

        let mut providers = ProviderRegistry::new();
        if config.social.google_enabled {
            providers.register(Arc::new(GoogleProvider::new(&config.social)?));
            tracing::info!("Google sign-in enabled");
        } else {
            tracing::info!("Google sign-in disabled");
        }

        Self::from_parts(config, db, providers)
    }

    /// Assemble services over an existing pool and provider set
    pub fn from_parts(
        config: ServerConfig,
        db: SqlitePool,
        providers: ProviderRegistry,
    ) -> ApiResult<Self> {
        let hasher = PasswordHasher::new(&config.authentication)?;
        let accounts = Arc::new(AccountManager::new(db.clone(), hasher));

        let tokens = Arc::new(TokenIssuer::new(
            &config.authentication,
            TokenStore::new(db.clone()),
            accounts.clone(),
        ));

        let social = Arc::new(SocialLinker::new(db.clone(), providers, accounts.clone()));

        let backend = Arc::new(DiskMediaBackend::new(config.storage.media_root.clone()));
        let media = Arc::new(MediaManager::new(
            db.clone(),
            backend,
            config.media.clone(),
            config.service.public_url.as_deref(),
            &config.service.api_prefix,
        ));

        let posts = Arc::new(PostManager::new(db.clone()));
        let comments = Arc::new(CommentManager::new(db.clone()));
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            db,
            accounts,
            tokens,
            social,
            posts,
            comments,
            media,
            rate_limiter,
        })
    }

    /// Ensure the media root exists; the pool creates the database directory
    async fn ensure_directories(config: &ServerConfig) -> ApiResult<()> {
        tokio::fs::create_dir_all(&config.storage.media_root)
            .await
            .map_err(|e| {
                ApiError::Internal(format!(
                    "Failed to create directory {:?}: {}",
                    config.storage.media_root, e
                ))
            })?;

        Ok(())
    }

    /// Address the server binds to
    pub fn bind_address(&self) -> String {
        format!(
            "{}:{}",
            self.config.service.hostname, self.config.service.port
        )
    }
}
