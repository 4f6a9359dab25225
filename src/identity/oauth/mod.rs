//! Federated sign-in collaborators.
//!
//! An [`OAuthClient`] owns the provider handshake: it builds the authorization
//! URL and turns a callback code into an [`OAuthGrant`]. Token signatures and
//! protocol details stay inside the client; callers only see the grant.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

use super::model::FederatedGrant;

pub mod google;

pub use google::{GoogleClient, GoogleConfig};

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("provider {0} is not configured")]
    UnknownProvider(String),
    #[error("provider rejected the exchange: {0}")]
    Rejected(String),
    #[error("provider response is missing {0}")]
    MissingField(&'static str),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid provider url: {0}")]
    Url(#[from] url::ParseError),
}

/// Profile facts the provider asserts about the account holder.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderProfile {
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Result of a successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthGrant {
    pub profile: ProviderProfile,
    pub account: FederatedGrant,
}

#[async_trait]
pub trait OAuthClient: Send + Sync {
    /// Provider name, as used in routes and the `accounts.provider` column.
    fn provider(&self) -> &str;

    /// Where to send the browser to start the handshake.
    ///
    /// # Errors
    /// Returns an error if the configured endpoint is not a valid URL.
    fn authorize_url(&self, state: &str) -> Result<Url, OAuthError>;

    /// Trade a callback code for tokens and a profile.
    async fn exchange(&self, code: &str) -> Result<OAuthGrant, OAuthError>;
}

/// Configured providers, keyed by name.
#[derive(Clone, Default)]
pub struct OAuthProviders {
    clients: BTreeMap<String, Arc<dyn OAuthClient>>,
}

impl OAuthProviders {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_client(mut self, client: Arc<dyn OAuthClient>) -> Self {
        self.clients.insert(client.provider().to_string(), client);
        self
    }

    /// # Errors
    /// Returns [`OAuthError::UnknownProvider`] if no client is registered.
    pub fn get(&self, provider: &str) -> Result<&Arc<dyn OAuthClient>, OAuthError> {
        self.clients
            .get(provider)
            .ok_or_else(|| OAuthError::UnknownProvider(provider.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::model::{AccountKind, ProviderTokens};

    struct Dummy;

    #[async_trait]
    impl OAuthClient for Dummy {
        fn provider(&self) -> &str {
            "dummy"
        }

        fn authorize_url(&self, state: &str) -> Result<Url, OAuthError> {
            Ok(Url::parse_with_params(
                "https://dummy.test/authorize",
                &[("state", state)],
            )?)
        }

        async fn exchange(&self, code: &str) -> Result<OAuthGrant, OAuthError> {
            Ok(OAuthGrant {
                profile: ProviderProfile::default(),
                account: FederatedGrant {
                    kind: AccountKind::OAuth,
                    provider: "dummy".to_string(),
                    provider_account_id: code.to_string(),
                    tokens: ProviderTokens::default(),
                    session_state: None,
                },
            })
        }
    }

    #[test]
    fn registry_resolves_by_provider_name() {
        let providers = OAuthProviders::new().with_client(Arc::new(Dummy));
        assert!(providers.get("dummy").is_ok());
        assert!(matches!(
            providers.get("google"),
            Err(OAuthError::UnknownProvider(name)) if name == "google"
        ));
        assert_eq!(providers.names().collect::<Vec<_>>(), vec!["dummy"]);
    }
}
