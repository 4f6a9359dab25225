//! Opaque session tokens.
//!
//! The raw token only ever travels to the client. The store keeps its SHA-256
//! hash, so a leaked table cannot be replayed as cookies.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, instrument};

use super::claims::{self, SessionClaims, SessionShell};
use super::model::{AccountGrant, LinkedAccount, NewSession, User};
use super::store::{IdentityStore, StoreError};

const TOKEN_BYTES: usize = 32;
const INSERT_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to generate session token: {0}")]
    Entropy(#[from] rand::Error),
    #[error("failed to generate a unique session token")]
    Exhausted,
    #[error("session lifetime {0} runs past the supported date range")]
    ExpiryOutOfRange(Duration),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Create a new session token for the auth cookie.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate_token() -> Result<String, rand::Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.try_fill_bytes(&mut bytes)?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a token so raw values never touch the database.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// A freshly persisted session. `token` is the only copy of the raw value.
#[derive(Clone, Debug)]
pub struct IssuedSession {
    pub token: SecretString,
    pub user_id: uuid::Uuid,
    pub expires: DateTime<Utc>,
    pub claims: SessionClaims,
}

impl IssuedSession {
    #[must_use]
    pub fn token(&self) -> &str {
        self.token.expose_secret()
    }
}

/// A live session read back from its token.
#[derive(Clone, Debug)]
pub struct ResolvedSession {
    pub user: User,
    pub claims: SessionClaims,
    pub shell: SessionShell,
}

#[derive(Clone)]
pub struct SessionIssuer {
    store: Arc<dyn IdentityStore>,
    ttl: Duration,
}

impl SessionIssuer {
    pub fn new(store: Arc<dyn IdentityStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Persist a session for `user`, signed in through `account` when federated.
    ///
    /// # Errors
    /// Fails if the store rejects the insert or three tokens in a row collide.
    #[instrument(skip_all, fields(user_id = %user.id))]
    pub async fn issue(
        &self,
        user: &User,
        account: Option<&LinkedAccount>,
    ) -> Result<IssuedSession, SessionError> {
        let grant = account.map_or(AccountGrant::Local, |account| {
            AccountGrant::Federated(account.grant())
        });
        let expires = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or(SessionError::ExpiryOutOfRange(self.ttl))?;

        for _ in 0..INSERT_ATTEMPTS {
            let token = generate_token()?;
            let result = self
                .store
                .create_session(NewSession {
                    token_hash: hash_token(&token),
                    user_id: user.id,
                    account_id: account.map(|account| account.id),
                    expires,
                })
                .await;

            match result {
                Ok(_) => {
                    return Ok(IssuedSession {
                        token: SecretString::from(token),
                        user_id: user.id,
                        expires,
                        claims: claims::assemble(user, &grant),
                    })
                }
                Err(StoreError::Conflict(_)) => debug!("session token collision, retrying"),
                Err(err) => return Err(err.into()),
            }
        }

        Err(SessionError::Exhausted)
    }

    /// Resolve a raw token into an enriched session.
    ///
    /// Expired sessions are deleted on sight. A session whose user is gone
    /// resolves to `None`.
    ///
    /// # Errors
    /// Returns storage faults only.
    pub async fn resolve(&self, token: &str) -> Result<Option<ResolvedSession>, StoreError> {
        let token_hash = hash_token(token);
        let Some(session) = self.store.session_by_token_hash(&token_hash).await? else {
            return Ok(None);
        };

        if session.is_expired(Utc::now()) {
            debug!("dropping expired session");
            self.store.delete_session(&token_hash).await?;
            return Ok(None);
        }

        let Some(user) = self.store.user_by_id(session.user_id).await? else {
            return Ok(None);
        };

        let grant = match session.account_id {
            Some(account_id) => self
                .store
                .account_by_id(account_id)
                .await?
                .map_or(AccountGrant::Local, |account| {
                    AccountGrant::Federated(account.grant())
                }),
            None => AccountGrant::Local,
        };

        let claims = claims::assemble(&user, &grant);
        let shell = claims::project(&claims, SessionShell::for_user(&user, session.expires));
        Ok(Some(ResolvedSession {
            user,
            claims,
            shell,
        }))
    }

    /// # Errors
    /// Returns storage faults only; unknown tokens are not an error.
    pub async fn revoke(&self, token: &str) -> Result<(), StoreError> {
        self.store.delete_session(&hash_token(token)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::model::{AccountKind, FederatedGrant, NewUser, ProviderTokens};
    use crate::identity::store::MemoryStore;
    use anyhow::Result;

    fn grant() -> FederatedGrant {
        FederatedGrant {
            kind: AccountKind::OAuth,
            provider: "google".to_string(),
            provider_account_id: "g-1".to_string(),
            tokens: ProviderTokens {
                access_token: Some("at".to_string()),
                refresh_token: Some("rt".to_string()),
                ..ProviderTokens::default()
            },
            session_state: None,
        }
    }

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            ..NewUser::default()
        }
    }

    #[test]
    fn generated_tokens_decode_to_32_bytes() -> Result<()> {
        let token = generate_token()?;
        let bytes = Base64UrlUnpadded::decode_vec(&token)
            .map_err(|err| anyhow::anyhow!("decode failed: {err}"))?;
        assert_eq!(bytes.len(), TOKEN_BYTES);
        assert!(!token.contains('='));
        Ok(())
    }

    #[test]
    fn hash_token_is_stable() {
        assert_eq!(hash_token("token"), hash_token("token"));
        assert_ne!(hash_token("token"), hash_token("other"));
        assert_eq!(hash_token("token").len(), 32);
    }

    #[tokio::test]
    async fn issued_session_resolves_with_local_claims() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user(new_user("a@b.com")).await?;
        let issuer = SessionIssuer::new(store.clone(), Duration::hours(1));

        let issued = issuer.issue(&user, None).await?;
        assert_eq!(issued.claims.access_token, None);

        let resolved = issuer.resolve(issued.token()).await?;
        let shell = resolved.map(|session| session.shell);
        assert_eq!(shell.as_ref().and_then(|shell| shell.user.id), Some(user.id));
        assert_eq!(shell.and_then(|shell| shell.access_token), None);
        Ok(())
    }

    #[tokio::test]
    async fn federated_session_reenriches_tokens_on_read() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let (user, account) = store
            .create_user_with_account(new_user("a@b.com"), &grant())
            .await?;
        let issuer = SessionIssuer::new(store.clone(), Duration::hours(1));

        let issued = issuer.issue(&user, Some(&account)).await?;
        assert_eq!(issued.claims.access_token.as_deref(), Some("at"));

        let resolved = issuer.resolve(issued.token()).await?;
        let shell = resolved.map(|session| session.shell);
        assert_eq!(shell.as_ref().and_then(|shell| shell.user.id), Some(user.id));
        assert_eq!(
            shell.and_then(|shell| shell.refresh_token).as_deref(),
            Some("rt")
        );
        Ok(())
    }

    #[tokio::test]
    async fn expired_sessions_are_deleted_on_read() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user(new_user("a@b.com")).await?;
        let issuer = SessionIssuer::new(store.clone(), Duration::seconds(-1));

        let issued = issuer.issue(&user, None).await?;
        assert_eq!(store.counts().await.sessions, 1);
        assert!(issuer.resolve(issued.token()).await?.is_none());
        assert_eq!(store.counts().await.sessions, 0);
        Ok(())
    }

    #[tokio::test]
    async fn lifetime_past_the_calendar_fails_without_a_row() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user(new_user("a@b.com")).await?;
        let issuer = SessionIssuer::new(store.clone(), Duration::seconds(10_000_000_000_000));

        let result = issuer.issue(&user, None).await;
        assert!(matches!(result, Err(SessionError::ExpiryOutOfRange(_))));
        assert_eq!(store.counts().await.sessions, 0);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_and_revoked_tokens_resolve_to_none() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_user(new_user("a@b.com")).await?;
        let issuer = SessionIssuer::new(store.clone(), Duration::hours(1));

        assert!(issuer.resolve("nope").await?.is_none());

        let issued = issuer.issue(&user, None).await?;
        issuer.revoke(issued.token()).await?;
        issuer.revoke(issued.token()).await?;
        assert!(issuer.resolve(issued.token()).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn issuing_for_unknown_user_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let issuer = SessionIssuer::new(store, Duration::hours(1));
        let ghost = User {
            id: uuid::Uuid::new_v4(),
            email: "ghost@b.com".to_string(),
            password_hash: None,
            name: None,
            image: None,
            email_verified: None,
        };
        let result = issuer.issue(&ghost, None).await;
        assert!(matches!(
            result,
            Err(SessionError::Store(StoreError::OrphanReference(_)))
        ));
    }
}
