//! In-process identity store.
//!
//! A single mutex guards all tables so check-then-insert sequences are atomic,
//! which gives the same uniqueness guarantees as the Postgres indexes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{IdentityStore, StoreError};
use crate::identity::model::{
    FederatedGrant, LinkedAccount, NewSession, NewUser, ProviderTokens, Session, User,
    VerificationToken,
};

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    accounts: HashMap<Uuid, LinkedAccount>,
    sessions: HashMap<Vec<u8>, Session>,
    verification_tokens: HashMap<(String, Vec<u8>), VerificationToken>,
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|user| user.email == email)
    }

    fn account_taken(&self, provider: &str, provider_account_id: &str) -> bool {
        self.accounts.values().any(|account| {
            account.provider == provider && account.provider_account_id == provider_account_id
        })
    }

    fn insert_user(&mut self, user: NewUser) -> User {
        let user = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
            image: user.image,
            email_verified: user.email_verified,
        };
        self.users.insert(user.id, user.clone());
        user
    }

    fn insert_account(&mut self, user_id: Uuid, grant: &FederatedGrant) -> LinkedAccount {
        let account = LinkedAccount {
            id: Uuid::new_v4(),
            user_id,
            kind: grant.kind,
            provider: grant.provider.clone(),
            provider_account_id: grant.provider_account_id.clone(),
            tokens: grant.tokens.clone(),
            session_state: grant.session_state.clone(),
        };
        self.accounts.insert(account.id, account.clone());
        account
    }
}

/// Row counts, used to assert that rejected requests wrote nothing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RowCounts {
    pub users: usize,
    pub accounts: usize,
    pub sessions: usize,
    pub verification_tokens: usize,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn counts(&self) -> RowCounts {
        let tables = self.tables.lock().await;
        RowCounts {
            users: tables.users.len(),
            accounts: tables.accounts.len(),
            sessions: tables.sessions.len(),
            verification_tokens: tables.verification_tokens.len(),
        }
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.users.values().find(|user| user.email == email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.email_taken(&user.email) {
            return Err(StoreError::Conflict("users.email"));
        }
        Ok(tables.insert_user(user))
    }

    async fn user_by_account(
        &self,
        provider: &str,
        provider_account_id: &str,
    ) -> Result<Option<(User, LinkedAccount)>, StoreError> {
        let tables = self.tables.lock().await;
        let found = tables.accounts.values().find(|account| {
            account.provider == provider && account.provider_account_id == provider_account_id
        });
        Ok(found.and_then(|account| {
            tables
                .users
                .get(&account.user_id)
                .map(|user| (user.clone(), account.clone()))
        }))
    }

    async fn create_user_with_account(
        &self,
        user: NewUser,
        grant: &FederatedGrant,
    ) -> Result<(User, LinkedAccount), StoreError> {
        let mut tables = self.tables.lock().await;
        if tables.email_taken(&user.email) {
            return Err(StoreError::Conflict("users.email"));
        }
        if tables.account_taken(&grant.provider, &grant.provider_account_id) {
            return Err(StoreError::Conflict("accounts.provider_account_id"));
        }
        let user = tables.insert_user(user);
        let account = tables.insert_account(user.id, grant);
        Ok((user, account))
    }

    async fn link_account(
        &self,
        user_id: Uuid,
        grant: &FederatedGrant,
    ) -> Result<LinkedAccount, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&user_id) {
            return Err(StoreError::OrphanReference(user_id));
        }
        if tables.account_taken(&grant.provider, &grant.provider_account_id) {
            return Err(StoreError::Conflict("accounts.provider_account_id"));
        }
        Ok(tables.insert_account(user_id, grant))
    }

    async fn account_by_id(&self, id: Uuid) -> Result<Option<LinkedAccount>, StoreError> {
        Ok(self.tables.lock().await.accounts.get(&id).cloned())
    }

    async fn update_account_tokens(
        &self,
        account_id: Uuid,
        tokens: &ProviderTokens,
    ) -> Result<(), StoreError> {
        if let Some(account) = self.tables.lock().await.accounts.get_mut(&account_id) {
            account.tokens = tokens.clone();
        }
        Ok(())
    }

    async fn create_session(&self, session: NewSession) -> Result<Session, StoreError> {
        let mut tables = self.tables.lock().await;
        if !tables.users.contains_key(&session.user_id) {
            return Err(StoreError::OrphanReference(session.user_id));
        }
        if tables.sessions.contains_key(&session.token_hash) {
            return Err(StoreError::Conflict("sessions.session_token_hash"));
        }
        let session = Session {
            id: Uuid::new_v4(),
            token_hash: session.token_hash,
            user_id: session.user_id,
            account_id: session.account_id,
            expires: session.expires,
        };
        tables
            .sessions
            .insert(session.token_hash.clone(), session.clone());
        Ok(session)
    }

    async fn session_by_token_hash(
        &self,
        token_hash: &[u8],
    ) -> Result<Option<Session>, StoreError> {
        Ok(self.tables.lock().await.sessions.get(token_hash).cloned())
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        self.tables.lock().await.sessions.remove(token_hash);
        Ok(())
    }

    async fn create_verification_token(&self, token: VerificationToken) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().await;
        let key = (token.identifier.clone(), token.token_hash.clone());
        if tables.verification_tokens.contains_key(&key) {
            return Err(StoreError::Conflict("verification_tokens.pkey"));
        }
        tables.verification_tokens.insert(key, token);
        Ok(())
    }

    async fn use_verification_token(
        &self,
        identifier: &str,
        token_hash: &[u8],
    ) -> Result<Option<VerificationToken>, StoreError> {
        let key = (identifier.to_string(), token_hash.to_vec());
        Ok(self.tables.lock().await.verification_tokens.remove(&key))
    }

    async fn mark_email_verified(
        &self,
        email: &str,
        verified_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.lock().await;
        match tables.users.values_mut().find(|user| user.email == email) {
            Some(user) => {
                user.email_verified = Some(verified_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
