/// Rate Limiting System
///
/// One keyed GCRA limiter per scope. Keys are account ids for
/// authenticated scopes and client IPs otherwise.
use crate::{
    config::RateLimitConfig,
    context::AppContext,
    error::{ApiError, ApiResult},
};
use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{request::Parts, Extensions, HeaderMap},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    DefaultKeyedRateLimiter, Quota, RateLimiter as GovernorLimiter,
};
use std::{convert::Infallible, net::SocketAddr, num::NonZeroU32, time::Duration};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitScope {
    /// Password and social login, keyed by client IP
    Login,
    /// Registration, keyed by client IP
    Register,
    /// Post creation, keyed by account
    PostCreate,
    /// Comment creation, keyed by account
    CommentCreate,
    /// Every request, keyed by client IP
    Global,
}

impl RateLimitScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitScope::Login => "login",
            RateLimitScope::Register => "register",
            RateLimitScope::PostCreate => "post_create",
            RateLimitScope::CommentCreate => "comment_create",
            RateLimitScope::Global => "global",
        }
    }
}

/// Rate limiter manager
pub struct RateLimiter {
    enabled: bool,
    login: DefaultKeyedRateLimiter<String>,
    register: DefaultKeyedRateLimiter<String>,
    post_create: DefaultKeyedRateLimiter<String>,
    comment_create: DefaultKeyedRateLimiter<String>,
    global: DefaultKeyedRateLimiter<String>,
}

fn per_minute(requests: u32) -> Quota {
    Quota::per_minute(NonZeroU32::new(requests).unwrap_or(NonZeroU32::MIN))
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            enabled: config.enabled,
            login: GovernorLimiter::keyed(per_minute(config.login_per_minute)),
            register: GovernorLimiter::keyed(per_minute(config.register_per_minute)),
            post_create: GovernorLimiter::keyed(per_minute(config.post_create_per_minute)),
            comment_create: GovernorLimiter::keyed(per_minute(config.comment_create_per_minute)),
            global: GovernorLimiter::keyed(per_minute(config.global_requests_per_minute)),
        }
    }

    fn limiter(&self, scope: RateLimitScope) -> &DefaultKeyedRateLimiter<String> {
        match scope {
            RateLimitScope::Login => &self.login,
            RateLimitScope::Register => &self.register,
            RateLimitScope::PostCreate => &self.post_create,
            RateLimitScope::CommentCreate => &self.comment_create,
            RateLimitScope::Global => &self.global,
        }
    }

    /// Count one request against `key` in `scope`
    pub fn check(&self, scope: RateLimitScope, key: &str) -> ApiResult<()> {
        if !self.enabled {
            return Ok(());
        }

        match self.limiter(scope).check_key(&key.to_string()) {
            Ok(()) => Ok(()),
            Err(not_until) => {
                let wait = not_until.wait_time_from(DefaultClock::default().now());
                let retry_after = Duration::from_secs(wait.as_secs().max(1));
                tracing::warn!(
                    "Rate limit exceeded for {} scope (key {}), retry in {}s",
                    scope.as_str(),
                    key,
                    retry_after.as_secs()
                );
                Err(ApiError::RateLimited { retry_after })
            }
        }
    }

    /// Drop state for keys that are back at full capacity
    pub fn retain_recent(&self) {
        self.login.retain_recent();
        self.register.retain_recent();
        self.post_create.retain_recent();
        self.comment_create.retain_recent();
        self.global.retain_recent();
    }

    /// Number of tracked keys across scopes
    pub fn tracked_keys(&self) -> usize {
        self.login.len()
            + self.register.len()
            + self.post_create.len()
            + self.comment_create.len()
            + self.global.len()
    }
}

/// Client address used as the limiter key
///
/// The socket address unless `trusted_proxies` hops sit in front of the
/// server. Then it is the X-Forwarded-For entry that many hops from the
/// right, the last one appended by a proxy we control. Entries further left
/// are client-supplied and never used.
pub fn client_ip(
    headers: &HeaderMap,
    remote: Option<SocketAddr>,
    trusted_proxies: usize,
) -> String {
    let remote_ip = remote.map(|addr| addr.ip().to_string());

    let forwarded = if trusted_proxies == 0 {
        None
    } else {
        headers
            .get("x-forwarded-for")
            .and_then(|h| h.to_str().ok())
            .and_then(|value| {
                let hops: Vec<&str> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|ip| !ip.is_empty())
                    .collect();
                // A shorter chain was written entirely by trusted proxies
                let index = hops.len().saturating_sub(trusted_proxies);
                hops.get(index).map(|ip| ip.to_string())
            })
    };

    forwarded
        .or(remote_ip)
        .unwrap_or_else(|| "unknown".to_string())
}

fn remote_addr(extensions: &Extensions) -> Option<SocketAddr> {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Client IP extractor
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

#[async_trait]
impl FromRequestParts<AppContext> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        Ok(ClientIp(client_ip(
            &parts.headers,
            remote_addr(&parts.extensions),
            ctx.config.rate_limit.trusted_proxies,
        )))
    }
}

/// Global per-client rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(
        request.headers(),
        remote_addr(request.extensions()),
        ctx.config.rate_limit.trusted_proxies,
    );

    ctx.rate_limiter.check(RateLimitScope::Global, &ip)?;

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            login_per_minute: 3,
            register_per_minute: 2,
            post_create_per_minute: 5,
            comment_create_per_minute: 5,
            global_requests_per_minute: 100,
            trusted_proxies: 0,
        }
    }

    #[test]
    fn test_burst_limit_with_retry_after() {
        let limiter = RateLimiter::new(&config());

        for _ in 0..3 {
            assert!(limiter.check(RateLimitScope::Login, "10.0.0.1").is_ok());
        }

        match limiter.check(RateLimitScope::Login, "10.0.0.1") {
            Err(ApiError::RateLimited { retry_after }) => {
                assert!(retry_after >= Duration::from_secs(1));
            }
            other => panic!("expected rate limit, got {other:?}"),
        }
    }

    #[test]
    fn test_keys_and_scopes_are_independent() {
        let limiter = RateLimiter::new(&config());

        for _ in 0..2 {
            limiter.check(RateLimitScope::Register, "10.0.0.1").unwrap();
        }
        assert!(limiter.check(RateLimitScope::Register, "10.0.0.1").is_err());

        assert!(limiter.check(RateLimitScope::Register, "10.0.0.2").is_ok());
        assert!(limiter.check(RateLimitScope::Login, "10.0.0.1").is_ok());
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let mut config = config();
        config.enabled = false;
        let limiter = RateLimiter::new(&config);

        for _ in 0..50 {
            assert!(limiter.check(RateLimitScope::Register, "10.0.0.1").is_ok());
        }
    }

    #[test]
    fn test_zero_quota_falls_back_to_one() {
        let mut config = config();
        config.login_per_minute = 0;
        let limiter = RateLimiter::new(&config);

        assert!(limiter.check(RateLimitScope::Login, "k").is_ok());
        assert!(limiter.check(RateLimitScope::Login, "k").is_err());
    }

    #[test]
    fn test_client_ip_ignores_forwarding_headers_without_proxies() {
        let remote: SocketAddr = "192.0.2.7:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_ip(&headers, Some(remote), 0), "192.0.2.7");
        assert_eq!(client_ip(&headers, None, 0), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        assert_eq!(client_ip(&headers, Some(remote), 0), "192.0.2.7");
    }

    #[test]
    fn test_client_ip_counts_trusted_hops_from_the_right() {
        let remote: SocketAddr = "10.0.0.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        // No header from the proxy: fall back to the socket
        assert_eq!(client_ip(&headers, Some(remote), 1), "10.0.0.1");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 203.0.113.9, 10.0.0.2"),
        );
        assert_eq!(client_ip(&headers, Some(remote), 1), "10.0.0.2");
        assert_eq!(client_ip(&headers, Some(remote), 2), "203.0.113.9");
        assert_eq!(client_ip(&headers, Some(remote), 5), "1.2.3.4");

        // X-Real-IP is never consulted
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers, Some(remote), 1), "10.0.0.2");
    }
}
