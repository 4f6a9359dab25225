//! Credential validation: input shape, user lookup, hash comparison.

use regex::Regex;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, OnceLock};
use tracing::debug;

use super::model::User;
use super::password::{PasswordError, PasswordScheme};
use super::store::{IdentityStore, StoreError};

pub const MIN_PASSWORD_CHARS: usize = 6;
/// Matches the width of `users.email`.
pub const MAX_EMAIL_CHARS: usize = 64;

/// Email and password as submitted.
#[derive(Clone, Debug)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::from(password.into()),
        }
    }
}

/// Which rule a malformed submission broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeViolation {
    Email,
    EmailTooLong,
    PasswordTooShort,
}

/// Outcome of checking a credential pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CredentialCheck {
    Valid(User),
    /// No such account, no local password, or wrong password. Deliberately
    /// indistinguishable to callers.
    Invalid,
    Malformed(ShapeViolation),
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialFault {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Password(#[from] PasswordError),
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    static EMAIL: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").ok())
        .as_ref()
        .is_some_and(|regex| regex.is_match(email_normalized))
}

#[must_use]
pub fn valid_password(password: &SecretString) -> bool {
    password.expose_secret().chars().count() >= MIN_PASSWORD_CHARS
}

/// Shape-check credentials and return the normalized email.
///
/// # Errors
/// Returns the first rule the input violates.
pub fn check_shape(credentials: &Credentials) -> Result<String, ShapeViolation> {
    let email = normalize_email(&credentials.email);
    if !valid_email(&email) {
        return Err(ShapeViolation::Email);
    }
    if email.chars().count() > MAX_EMAIL_CHARS {
        return Err(ShapeViolation::EmailTooLong);
    }
    if !valid_password(&credentials.password) {
        return Err(ShapeViolation::PasswordTooShort);
    }
    Ok(email)
}

#[derive(Clone)]
pub struct CredentialValidator {
    store: Arc<dyn IdentityStore>,
    passwords: Arc<dyn PasswordScheme>,
}

impl CredentialValidator {
    pub fn new(store: Arc<dyn IdentityStore>, passwords: Arc<dyn PasswordScheme>) -> Self {
        Self { store, passwords }
    }

    /// Check a credential pair. Never writes to the store.
    ///
    /// # Errors
    /// Only infrastructure faults are errors; bad input and bad credentials
    /// are returned as [`CredentialCheck`] values.
    pub async fn check(
        &self,
        credentials: &Credentials,
    ) -> Result<CredentialCheck, CredentialFault> {
        let email = match check_shape(credentials) {
            Ok(email) => email,
            Err(violation) => return Ok(CredentialCheck::Malformed(violation)),
        };

        let Some(user) = self.store.user_by_email(&email).await? else {
            debug!("credential check: no account");
            return Ok(CredentialCheck::Invalid);
        };

        let Some(hash) = user.password_hash.as_deref() else {
            debug!("credential check: account has no local password");
            return Ok(CredentialCheck::Invalid);
        };

        if self.passwords.verify(&credentials.password, hash).await? {
            Ok(CredentialCheck::Valid(user))
        } else {
            debug!("credential check: password mismatch");
            Ok(CredentialCheck::Invalid)
        }
    }
}
