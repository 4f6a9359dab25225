//! Fast, deterministic collaborators for unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use url::Url;
use uuid::Uuid;

use super::model::{
    AccountKind, FederatedGrant, LinkedAccount, NewSession, NewUser, ProviderTokens, Session,
    User, VerificationToken,
};
use super::oauth::{OAuthClient, OAuthError, OAuthGrant, ProviderProfile};
use super::password::{PasswordError, PasswordScheme};
use super::store::{IdentityStore, MemoryStore, StoreError};
use super::verification::{VerificationMessage, VerificationSender};

/// Reversible stand-in so tests do not pay for Argon2.
pub struct PlainScheme;

#[async_trait]
impl PasswordScheme for PlainScheme {
    async fn hash(&self, password: &SecretString) -> Result<String, PasswordError> {
        Ok(format!("plain:{}", password.expose_secret()))
    }

    async fn verify(&self, password: &SecretString, hash: &str) -> Result<bool, PasswordError> {
        Ok(hash == format!("plain:{}", password.expose_secret()))
    }
}

/// Exchanges `code` for an account whose id is the code itself.
/// The code `denied` is rejected like a user declining consent.
pub struct FakeProvider;

#[async_trait]
impl OAuthClient for FakeProvider {
    fn provider(&self) -> &str {
        "google"
    }

    fn authorize_url(&self, state: &str) -> Result<Url, OAuthError> {
        Ok(Url::parse_with_params(
            "https://provider.test/authorize",
            &[("state", state)],
        )?)
    }

    async fn exchange(&self, code: &str) -> Result<OAuthGrant, OAuthError> {
        if code == "denied" {
            return Err(OAuthError::Rejected("access_denied".to_string()));
        }
        Ok(OAuthGrant {
            profile: ProviderProfile {
                email: Some(format!("{code}@provider.test")),
                email_verified: true,
                name: None,
                image: None,
            },
            account: FederatedGrant {
                kind: AccountKind::OAuth,
                provider: "google".to_string(),
                provider_account_id: code.to_string(),
                tokens: ProviderTokens {
                    access_token: Some("provider-at".to_string()),
                    refresh_token: Some("provider-rt".to_string()),
                    ..ProviderTokens::default()
                },
                session_state: None,
            },
        })
    }
}

/// Keeps every message so tests can pull the raw token back out.
#[derive(Default)]
pub struct CapturingSender {
    sent: Mutex<Vec<VerificationMessage>>,
}

impl CapturingSender {
    pub fn last_token(&self) -> Option<String> {
        self.sent.lock().ok()?.last().and_then(|message| {
            message
                .verify_url
                .split_once("#token=")
                .map(|(_, token)| token.to_string())
        })
    }
}

impl VerificationSender for CapturingSender {
    fn send(&self, message: &VerificationMessage) -> anyhow::Result<()> {
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("sender poisoned"))?
            .push(message.clone());
        Ok(())
    }
}

/// Which [`FaultyStore`] call should fail.
#[derive(Clone, Copy, Debug)]
pub enum Fault {
    UserByEmail,
    CreateSession,
}

/// Delegates to a [`MemoryStore`] but fails chosen calls the way a dropped
/// connection would.
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    user_by_email: AtomicBool,
    create_session: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            user_by_email: AtomicBool::new(false),
            create_session: AtomicBool::new(false),
        }
    }

    pub fn set(&self, fault: Fault, failing: bool) {
        self.flag(fault).store(failing, Ordering::SeqCst);
    }

    fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::UserByEmail => &self.user_by_email,
            Fault::CreateSession => &self.create_session,
        }
    }

    fn check(&self, fault: Fault) -> Result<(), StoreError> {
        if self.flag(fault).load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityStore for FaultyStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.inner.user_by_id(id).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        self.check(Fault::UserByEmail)?;
        self.inner.user_by_email(email).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.inner.create_user(user).await
    }

    async fn user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<(User, LinkedAccount)>, StoreError> {
        self.inner.user_by_account(provider, provider_account_id).await
    }

    async fn create_user_with_account(
        &self,
        user: NewUser,
        grant: &FederatedGrant,
    ) -> Result<(User, LinkedAccount), StoreError> {
        self.inner.create_user_with_account(user, grant).await
    }

    async fn link_account(
        &self,
        user_id: Uuid,
        grant: &FederatedGrant,
    ) -> Result<LinkedAccount, StoreError> {
        self.inner.link_account(user_id, grant).await
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<LinkedAccount>, StoreError> {
        self.inner.account_by_id(id).await
    }

    async fn update_account_tokens(
        &self,
        account_id: Uuid,
        tokens: &ProviderTokens,
    ) -> Result<(), StoreError> {
        self.inner.update_account_tokens(account_id, tokens).await
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        self.check(Fault::CreateSession)?;
        self.inner.create_session(session).await
    }

    async fn session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Session>, StoreError> {
        self.inner.session_by_token_hash(token_hash).await
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        self.inner.delete_session(token_hash).await
    }

    async fn create_verification_token(&self, token: VerificationToken) -> Result<(), StoreError> {
        self.inner.create_verification_token(token).await
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &[u8],
    ) -> Result<Option<VerificationToken>, StoreError> {
        self.inner.use_verification_token(identifier, token_hash).await
    }

    async fn mark_email_verified(
        &self,
        email: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.inner.mark_email_verified(email, verified_at).await
    }
}
