/// Configuration management for Agora
use crate::error::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub authentication: AuthConfig,
    pub social: SocialConfig,
    pub media: MediaConfig,
    pub rate_limit: RateLimitConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    /// Prefix every API route is nested under
    pub api_prefix: String,
    /// Externally visible base URL (used for media links)
    pub public_url: Option<String>,
    /// Allowed CORS origins; empty means any
    pub cors_origins: Vec<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database: PathBuf,
    pub media_root: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// Access token lifetime in seconds
    pub access_token_ttl: u64,
    /// Refresh token lifetime in seconds
    pub refresh_token_ttl: u64,
    /// Argon2 memory cost in KiB
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
}

/// Social login configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialConfig {
    pub google_enabled: bool,
    pub google_userinfo_url: String,
    /// Provider request timeout in seconds
    pub provider_timeout: u64,
}

/// Media upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Per-file size limit in bytes
    pub max_file_size: usize,
    pub allowed_content_types: Vec<String>,
    /// Whole request body limit for upload routes
    pub max_request_size: usize,
}

/// Rate limiting configuration, in requests per minute per caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub login_per_minute: u32,
    pub register_per_minute: u32,
    pub post_create_per_minute: u32,
    pub comment_create_per_minute: u32,
    pub global_requests_per_minute: u32,
    /// Reverse proxies in front of the server; 0 keys callers by socket address
    pub trusted_proxies: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(ApiError::invalid(format!("Unknown log format: {}", other))),
        }
    }
}

const DEFAULT_LOG_FILTER: &str = "agora=debug,tower_http=debug";

const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "video/mp4",
    "video/quicktime",
    "text/plain",
];

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env::var(key).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> ApiResult<Self> {
        dotenv::dotenv().ok();

        let defaults = ServerConfig::default();

        let hostname = env::var("AGORA_HOSTNAME").unwrap_or_else(|_| "0.0.0.0".to_string());
        // Render injects PORT
        let port = env::var("AGORA_PORT")
            .or_else(|_| env::var("PORT"))
            .unwrap_or_else(|_| "8000".to_string())
            .parse()
            .map_err(|_| ApiError::invalid("Invalid port number"))?;
        let api_prefix = env::var("AGORA_API_PREFIX")
            .unwrap_or_else(|_| defaults.service.api_prefix.clone());
        let public_url = env::var("AGORA_PUBLIC_URL")
            .or_else(|_| env::var("RENDER_EXTERNAL_URL"))
            .ok();
        let cors_origins = env_list("AGORA_CORS_ORIGINS").unwrap_or_default();

        let data_directory: PathBuf = env::var("AGORA_DATA_DIRECTORY")
            .unwrap_or_else(|_| "./data".to_string())
            .into();
        let database = env::var("AGORA_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("agora.sqlite"));
        let media_root = env::var("AGORA_MEDIA_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_directory.join("media"));

        let jwt_secret = env::var("AGORA_JWT_SECRET")
            .map_err(|_| ApiError::invalid("AGORA_JWT_SECRET is required"))?;

        let google_userinfo_url = env::var("AGORA_GOOGLE_USERINFO_URL")
            .unwrap_or_else(|_| defaults.social.google_userinfo_url.clone());

        let allowed_content_types = env_list("AGORA_MEDIA_ALLOWED_TYPES")
            .unwrap_or_else(|| defaults.media.allowed_content_types.clone());

        let log_level = env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string());
        let log_format = env::var("LOG_FORMAT")
            .ok()
            .map(|v| v.parse())
            .transpose()?
            .unwrap_or(LogFormat::Pretty);

        let auth = &defaults.authentication;
        let media = &defaults.media;
        let limits = &defaults.rate_limit;

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                api_prefix,
                public_url,
                cors_origins,
            },
            storage: StorageConfig {
                database,
                media_root,
            },
            authentication: AuthConfig {
                jwt_secret,
                access_token_ttl: env_or("AGORA_ACCESS_TOKEN_TTL", auth.access_token_ttl),
                refresh_token_ttl: env_or("AGORA_REFRESH_TOKEN_TTL", auth.refresh_token_ttl),
                argon2_memory_kib: env_or("AGORA_ARGON2_MEMORY_KIB", auth.argon2_memory_kib),
                argon2_iterations: env_or("AGORA_ARGON2_ITERATIONS", auth.argon2_iterations),
            },
            social: SocialConfig {
                google_enabled: env_or("AGORA_GOOGLE_ENABLED", true),
                google_userinfo_url,
                provider_timeout: env_or("AGORA_PROVIDER_TIMEOUT", defaults.social.provider_timeout),
            },
            media: MediaConfig {
                max_file_size: env_or("AGORA_MEDIA_MAX_FILE_SIZE", media.max_file_size),
                allowed_content_types,
                max_request_size: env_or("AGORA_MEDIA_MAX_REQUEST_SIZE", media.max_request_size),
            },
            rate_limit: RateLimitConfig {
                enabled: env_or("AGORA_RATE_LIMITS_ENABLED", true),
                login_per_minute: env_or("AGORA_RATE_LIMIT_LOGIN", limits.login_per_minute),
                register_per_minute: env_or("AGORA_RATE_LIMIT_REGISTER", limits.register_per_minute),
                post_create_per_minute: env_or(
                    "AGORA_RATE_LIMIT_POST_CREATE",
                    limits.post_create_per_minute,
                ),
                comment_create_per_minute: env_or(
                    "AGORA_RATE_LIMIT_COMMENT_CREATE",
                    limits.comment_create_per_minute,
                ),
                global_requests_per_minute: env_or(
                    "AGORA_RATE_LIMIT_GLOBAL",
                    limits.global_requests_per_minute,
                ),
                trusted_proxies: env_or("AGORA_TRUSTED_PROXIES", limits.trusted_proxies),
            },
            logging: LoggingConfig {
                level: log_level,
                format: log_format,
            },
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> ApiResult<()> {
        if self.authentication.jwt_secret.len() < 32 {
            return Err(ApiError::invalid(
                "JWT secret must be at least 32 characters",
            ));
        }

        if self.authentication.access_token_ttl == 0 || self.authentication.refresh_token_ttl == 0 {
            return Err(ApiError::invalid("Token lifetimes must be positive"));
        }

        if self.authentication.refresh_token_ttl <= self.authentication.access_token_ttl {
            return Err(ApiError::invalid(
                "Refresh token lifetime must exceed access token lifetime",
            ));
        }

        if !self.service.api_prefix.is_empty() && !self.service.api_prefix.starts_with('/') {
            return Err(ApiError::invalid("API prefix must start with '/'"));
        }

        if self.media.max_file_size == 0 {
            return Err(ApiError::invalid("Media size limit must be positive"));
        }

        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 8000,
                api_prefix: "/api".to_string(),
                public_url: None,
                cors_origins: Vec::new(),
            },
            storage: StorageConfig {
                database: PathBuf::from("./data/agora.sqlite"),
                media_root: PathBuf::from("./data/media"),
            },
            authentication: AuthConfig {
                jwt_secret: "development-secret-change-me-0123456789".to_string(),
                access_token_ttl: 15 * 60,
                refresh_token_ttl: 7 * 24 * 60 * 60,
                argon2_memory_kib: 19 * 1024,
                argon2_iterations: 2,
            },
            social: SocialConfig {
                google_enabled: true,
                google_userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
                provider_timeout: 10,
            },
            media: MediaConfig {
                max_file_size: 5 * 1024 * 1024,
                allowed_content_types: DEFAULT_ALLOWED_TYPES.iter().map(|s| s.to_string()).collect(),
                max_request_size: 50 * 1024 * 1024,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                login_per_minute: 10,
                register_per_minute: 5,
                post_create_per_minute: 30,
                comment_create_per_minute: 60,
                global_requests_per_minute: 1000,
                trusted_proxies: 0,
            },
            logging: LoggingConfig {
                level: DEFAULT_LOG_FILTER.to_string(),
                format: LogFormat::Pretty,
            },
        }
    }
}
