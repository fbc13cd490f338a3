/// Social login
///
/// An `IdentityProvider` turns a provider-issued OAuth access token into
/// verified claims. The `SocialLinker` maps those claims onto a local
/// account, creating or linking as needed.

mod google;
mod linker;

pub use google::GoogleProvider;
pub use linker::SocialLinker;

use crate::error::ApiError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Identity claims vouched for by a provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedClaims {
    /// Provider-assigned user id
    pub subject: String,
    pub email: String,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Provider verification failure
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Token invalid, expired, or claims unusable
    #[error("{0}")]
    Rejected(String),
    /// Provider unreachable or answered garbage
    #[error("{0}")]
    Network(String),
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected(message) => ApiError::ProviderRejected(message),
            ProviderError::Network(message) => ApiError::ProviderUnavailable(message),
        }
    }
}

/// A social login provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registry key, also stored on linked identities
    fn name(&self) -> &'static str;

    /// Exchange a provider access token for verified claims
    async fn verify(&self, provider_token: &str) -> Result<VerifiedClaims, ProviderError>;
}

/// Providers keyed by name
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<&'static str, Arc<dyn IdentityProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn IdentityProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn with(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn IdentityProvider>> {
        self.providers.get(name).cloned()
    }
}
