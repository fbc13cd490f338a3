/// Google identity provider backed by the OAuth2 userinfo endpoint
use crate::{
    config::SocialConfig,
    error::{ApiError, ApiResult},
    social::{IdentityProvider, ProviderError, VerifiedClaims},
};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Userinfo payload as Google returns it
#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: Option<String>,
    email: Option<String>,
    #[serde(default)]
    verified_email: bool,
    name: Option<String>,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

impl GoogleUserInfo {
    fn display_name(&self) -> Option<String> {
        if let Some(name) = self.name.as_deref().filter(|n| !n.trim().is_empty()) {
            return Some(name.trim().to_string());
        }
        let joined = [self.given_name.as_deref(), self.family_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!joined.is_empty()).then_some(joined)
    }
}

pub struct GoogleProvider {
    http_client: reqwest::Client,
    userinfo_url: String,
}

impl GoogleProvider {
    pub fn new(config: &SocialConfig) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("agora/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.provider_timeout))
            .build()
            .map_err(|e| ApiError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            userinfo_url: config.google_userinfo_url.clone(),
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    async fn verify(&self, provider_token: &str) -> Result<VerifiedClaims, ProviderError> {
        let response = self
            .http_client
            .get(&self.userinfo_url)
            .bearer_auth(provider_token)
            .send()
            .await
            .map_err(|e| {
                warn!("Google userinfo request failed: {}", e);
                ProviderError::Network(format!("Failed to reach Google: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            debug!("Google rejected access token with status {}", status);
            return Err(ProviderError::Rejected(
                "Invalid or expired Google access token".to_string(),
            ));
        }

        let info: GoogleUserInfo = response.json().await.map_err(|e| {
            warn!("Google userinfo response unreadable: {}", e);
            ProviderError::Network("Unexpected response from Google".to_string())
        })?;

        let display_name = info.display_name();
        let subject = info
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ProviderError::Rejected("Google did not return a user id".to_string()))?;
        let email = info
            .email
            .filter(|email| !email.is_empty())
            .ok_or_else(|| {
                ProviderError::Rejected("Google did not return an email address".to_string())
            })?;

        Ok(VerifiedClaims {
            subject,
            email,
            email_verified: info.verified_email,
            name: display_name,
            picture: info.picture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(name: Option<&str>, given: Option<&str>, family: Option<&str>) -> GoogleUserInfo {
        GoogleUserInfo {
            id: Some("123".to_string()),
            email: Some("carol@example.com".to_string()),
            verified_email: true,
            name: name.map(str::to_string),
            given_name: given.map(str::to_string),
            family_name: family.map(str::to_string),
            picture: None,
        }
    }

    #[test]
    fn test_display_name_fallbacks() {
        assert_eq!(
            info(Some("Carol C"), Some("X"), None).display_name().as_deref(),
            Some("Carol C")
        );
        assert_eq!(
            info(None, Some("Carol"), Some("Clark")).display_name().as_deref(),
            Some("Carol Clark")
        );
        assert_eq!(info(Some("  "), None, None).display_name(), None);
    }

    #[tokio::test]
    async fn test_unreachable_provider_is_network_error() {
        let config = SocialConfig {
            google_enabled: true,
            // Reserved port, nothing listens here
            google_userinfo_url: "http://127.0.0.1:9/userinfo".to_string(),
            provider_timeout: 2,
        };
        let provider = GoogleProvider::new(&config).unwrap();

        let err = provider.verify("token").await.unwrap_err();
        assert!(matches!(err, ProviderError::Network(_)));
    }
}
