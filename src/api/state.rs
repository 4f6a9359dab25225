//! Auth state and configuration shared by all handlers.

use chrono::Duration;
use std::sync::Arc;

use crate::identity::{
    access::{AccessPolicy, DEFAULT_HOME},
    oauth::OAuthProviders,
    password::PasswordScheme,
    store::IdentityStore,
    verification::{VerificationSender, Verifications},
    Authenticator,
};

const DEFAULT_SESSION_TTL_SECONDS: i64 = 30 * 24 * 60 * 60;
const DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;

/// Out-of-range values saturate; issuing against them then fails instead of
/// panicking.
fn lifetime(seconds: i64) -> Duration {
    Duration::try_seconds(seconds).unwrap_or(if seconds < 0 {
        Duration::MIN
    } else {
        Duration::MAX
    })
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    frontend_base_url: String,
    session_ttl_seconds: i64,
    verification_token_ttl_seconds: i64,
    home_path: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            verification_token_ttl_seconds: DEFAULT_VERIFICATION_TOKEN_TTL_SECONDS,
            home_path: DEFAULT_HOME.to_string(),
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verification_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verification_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_home_path(mut self, home_path: String) -> Self {
        self.home_path = home_path;
        self
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn verification_token_ttl_seconds(&self) -> i64 {
        self.verification_token_ttl_seconds
    }

    #[must_use]
    pub fn home_path(&self) -> &str {
        &self.home_path
    }

    /// Only mark cookies secure when the frontend is served over HTTPS.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn IdentityStore>,
    authenticator: Authenticator,
    verifications: Verifications,
    policy: AccessPolicy,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        store: Arc<dyn IdentityStore>,
        passwords: Arc<dyn PasswordScheme>,
        providers: OAuthProviders,
        sender: Arc<dyn VerificationSender>,
    ) -> Self {
        let authenticator = Authenticator::new(
            store.clone(),
            passwords,
            providers,
            lifetime(config.session_ttl_seconds()),
        );
        let verifications = Verifications::new(
            store.clone(),
            sender,
            lifetime(config.verification_token_ttl_seconds()),
            config.frontend_base_url().to_string(),
        );
        let policy = AccessPolicy::new().with_home(config.home_path().to_string());
        Self {
            config,
            store,
            authenticator,
            verifications,
            policy,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn IdentityStore> {
        &self.store
    }

    #[must_use]
    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    #[must_use]
    pub fn verifications(&self) -> &Verifications {
        &self.verifications
    }

    #[must_use]
    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }
}
