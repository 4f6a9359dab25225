//! Resolving a federated grant to a durable user.

use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::credentials::normalize_email;
use super::model::{LinkedAccount, NewUser, ProviderTokens, User};
use super::oauth::{OAuthError, OAuthGrant};
use super::outcome::AuthError;
use super::store::{IdentityStore, StoreError};

#[derive(Clone)]
pub struct AccountLinker {
    store: Arc<dyn IdentityStore>,
}

/// Fresh tokens win; a provider that omits the refresh token keeps the old one.
fn merge_tokens(stored: &ProviderTokens, fresh: &ProviderTokens) -> ProviderTokens {
    ProviderTokens {
        refresh_token: fresh
            .refresh_token
            .clone()
            .or_else(|| stored.refresh_token.clone()),
        ..fresh.clone()
    }
}

impl AccountLinker {
    pub fn new(store: Arc<dyn IdentityStore>) -> Self {
        Self { store }
    }

    async fn refresh(
        &self,
        mut account: LinkedAccount,
        grant: &OAuthGrant,
    ) -> Result<LinkedAccount, AuthError> {
        let tokens = merge_tokens(&account.tokens, &grant.account.tokens);
        self.store.update_account_tokens(account.id, &tokens).await?;
        account.tokens = tokens;
        Ok(account)
    }

    /// Sign in with a grant, creating the user on first sight.
    ///
    /// # Errors
    /// [`AuthError::AccountNotLinked`] when another user already owns the
    /// profile email; storage faults otherwise.
    pub async fn sign_in(&self, grant: &OAuthGrant) -> Result<(User, LinkedAccount), AuthError> {
        let provider = grant.account.provider.as_str();
        let provider_account_id = grant.account.provider_account_id.as_str();

        if let Some((user, account)) = self
            .store
            .user_by_account(provider, provider_account_id)
            .await?
        {
            debug!(provider, "known provider account");
            let account = self.refresh(account, grant).await?;
            return Ok((user, account));
        }

        let email = grant
            .profile
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|email| !email.is_empty())
            .ok_or(OAuthError::MissingField("email"))?;

        if self.store.user_by_email(&email).await?.is_some() {
            return Err(AuthError::AccountNotLinked);
        }

        let new_user = NewUser {
            email,
            password_hash: None,
            name: grant.profile.name.clone(),
            image: grant.profile.image.clone(),
            email_verified: grant.profile.email_verified.then(Utc::now),
        };

        match self
            .store
            .create_user_with_account(new_user, &grant.account)
            .await
        {
            Ok(created) => Ok(created),
            Err(StoreError::Conflict(constraint)) => {
                // Lost a creation race; sign in whoever won if it was this account.
                debug!(constraint, "concurrent provider sign-up");
                match self
                    .store
                    .user_by_account(provider, provider_account_id)
                    .await?
                {
                    Some(existing) => Ok(existing),
                    None => Err(AuthError::AccountNotLinked),
                }
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Attach a grant to an already signed-in user.
    ///
    /// # Errors
    /// [`AuthError::AccountLinkedElsewhere`] when a different user owns the
    /// provider account.
    pub async fn link(&self, user_id: Uuid, grant: &OAuthGrant) -> Result<LinkedAccount, AuthError> {
        let provider = grant.account.provider.as_str();
        let provider_account_id = grant.account.provider_account_id.as_str();

        if let Some((owner, account)) = self
            .store
            .user_by_account(provider, provider_account_id)
            .await?
        {
            if owner.id != user_id {
                return Err(AuthError::AccountLinkedElsewhere);
            }
            return self.refresh(account, grant).await;
        }

        match self.store.link_account(user_id, &grant.account).await {
            Ok(account) => Ok(account),
            Err(StoreError::Conflict(_)) => match self
                .store
                .user_by_account(provider, provider_account_id)
                .await?
            {
                Some((owner, account)) if owner.id == user_id => Ok(account),
                _ => Err(AuthError::AccountLinkedElsewhere),
            },
            Err(err) => Err(err.into()),
        }
    }
}
