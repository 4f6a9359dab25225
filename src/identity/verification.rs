//! Email verification tokens.
//!
//! Issuing stores only the token hash and hands the raw token to a
//! [`VerificationSender`]. Redeeming deletes the row whether or not it has
//! expired, so a token works at most once.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::credentials::normalize_email;
use super::model::VerificationToken;
use super::session::{generate_token, hash_token};
use super::store::{IdentityStore, StoreError};

/// Message handed to the delivery channel.
#[derive(Clone, Debug)]
pub struct VerificationMessage {
    pub identifier: String,
    pub verify_url: String,
}

pub trait VerificationSender: Send + Sync {
    /// # Errors
    /// Returns an error if the message could not be handed off.
    fn send(&self, message: &VerificationMessage) -> Result<()>;
}

/// Local development sender: logs instead of delivering.
pub struct LogVerificationSender;

impl VerificationSender for LogVerificationSender {
    fn send(&self, message: &VerificationMessage) -> Result<()> {
        info!(identifier = %message.identifier, "verification send stub");
        debug!(verify_url = %redact_token(&message.verify_url), "verification link");
        Ok(())
    }
}

/// Strip the token fragment from a verification link before it is logged.
#[must_use]
pub fn redact_token(verify_url: &str) -> String {
    match verify_url.split_once("#token=") {
        Some((base, _)) => format!("{base}#token=[redacted]"),
        None => verify_url.to_string(),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified,
    Invalid,
}

#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("failed to generate verification token: {0}")]
    Entropy(#[from] rand::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to send verification: {0}")]
    Delivery(anyhow::Error),
    #[error("verification lifetime {0} runs past the supported date range")]
    ExpiryOutOfRange(Duration),
}

/// Build the frontend verification link included in outbound messages.
#[must_use]
pub fn build_verify_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email#token={token}")
}

#[derive(Clone)]
pub struct Verifications {
    store: Arc<dyn IdentityStore>,
    sender: Arc<dyn VerificationSender>,
    ttl: Duration,
    frontend_base_url: String,
}

impl Verifications {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        sender: Arc<dyn VerificationSender>,
        ttl: Duration,
        frontend_base_url: String,
    ) -> Self {
        Self {
            store,
            sender,
            ttl,
            frontend_base_url,
        }
    }

    /// Issue a token for `identifier` and hand it to the sender.
    ///
    /// Unknown identifiers are accepted silently so the endpoint does not
    /// reveal which emails have accounts.
    ///
    /// # Errors
    /// Fails on entropy, storage or delivery faults, or when the lifetime
    /// overflows the calendar.
    #[instrument(skip_all)]
    pub async fn issue(&self, identifier: &str) -> Result<(), VerificationError> {
        let identifier = normalize_email(identifier);
        if self.store.user_by_email(&identifier).await?.is_none() {
            debug!("verification requested for unknown identifier");
            return Ok(());
        }

        let expires = Utc::now()
            .checked_add_signed(self.ttl)
            .ok_or(VerificationError::ExpiryOutOfRange(self.ttl))?;
        let token = generate_token()?;
        self.store
            .create_verification_token(VerificationToken {
                identifier: identifier.clone(),
                token_hash: hash_token(&token),
                expires,
            })
            .await?;

        self.sender
            .send(&VerificationMessage {
                verify_url: build_verify_url(&self.frontend_base_url, &token),
                identifier,
            })
            .map_err(VerificationError::Delivery)
    }

    /// Consume a token and mark the identifier's email as verified.
    ///
    /// # Errors
    /// Returns storage faults only.
    #[instrument(skip_all)]
    pub async fn redeem(&self, identifier: &str, token: &str) -> Result<VerifyOutcome, StoreError> {
        let identifier = normalize_email(identifier);
        let Some(stored) = self
            .store
            .use_verification_token(&identifier, &hash_token(token))
            .await?
        else {
            return Ok(VerifyOutcome::Invalid);
        };

        let now = Utc::now();
        if stored.expires <= now {
            debug!("verification token expired");
            return Ok(VerifyOutcome::Invalid);
        }

        if self.store.mark_email_verified(&identifier, now).await? {
            Ok(VerifyOutcome::Verified)
        } else {
            Ok(VerifyOutcome::Invalid)
        }
    }
}
