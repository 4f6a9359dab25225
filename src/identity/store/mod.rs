//! Persistence seam for users, linked accounts, sessions and verification
//! tokens.
//!
//! Every implementation must uphold the same constraints:
//!
//! - `users.email` is unique; a second insert yields [`StoreError::Conflict`].
//! - `(provider, provider_account_id)` maps to at most one user.
//! - Accounts and sessions must reference an existing user; dangling
//!   references yield [`StoreError::OrphanReference`] and nothing is written.
//! - `create_user_with_account` is all-or-nothing.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::model::{
    FederatedGrant, LinkedAccount, NewSession, NewUser, ProviderTokens, Session, User,
    VerificationToken,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgIdentityStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Conflict(&'static str),
    #[error("reference to missing user {0}")]
    OrphanReference(Uuid),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Cheap liveness check used by the health endpoint.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// Lookup by already-normalized email.
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<(User, LinkedAccount)>, StoreError>;

    /// Create a user and its first linked account in one transaction.
    async fn create_user_with_account(
        &self,
        user: NewUser,
        grant: &FederatedGrant,
    ) -> Result<(User, LinkedAccount), StoreError>;

    /// Attach a federated account to an existing user.
    async fn link_account(
        &self,
        user_id: Uuid,
        grant: &FederatedGrant,
    ) -> Result<LinkedAccount, StoreError>;

    async fn account_by_id(&self, id: Uuid) -> Result<Option<LinkedAccount>, StoreError>;

    async fn update_account_tokens(
        &self,
        account_id: Uuid,
        tokens: &ProviderTokens,
    ) -> Result<(), StoreError>;

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError>;

    async fn session_by_token_hash(&self, token_hash: &[u8])
        -> Result<Option<Session>, StoreError>;

    /// Idempotent; deleting a missing session is not an error.
    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError>;

    async fn create_verification_token(&self, token: VerificationToken) -> Result<(), StoreError>;

    /// Delete the token and return it if it existed, expired or not.
    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &[u8],
    ) -> Result<Option<VerificationToken>, StoreError>;

    /// Returns `false` when no user owns the email.
    async fn mark_email_verified(
        &self,
        email: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;
}
