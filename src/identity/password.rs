//! One-way password hashing.

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use password_hash::{rand_core::OsRng, SaltString};
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("stored password hash is malformed: {0}")]
    MalformedHash(String),
    #[error("hashing task aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Hash and compare passwords. Implementations must be one-way.
#[async_trait]
pub trait PasswordScheme: Send + Sync {
    async fn hash(&self, password: &SecretString) -> Result<String, PasswordError>;

    /// Compare a plaintext against a stored PHC string.
    async fn verify(&self, password: &SecretString, hash: &str) -> Result<bool, PasswordError>;
}

/// Argon2id with the crate defaults; work runs on the blocking pool.
#[derive(Clone, Debug, Default)]
pub struct Argon2Scheme;

#[async_trait]
impl PasswordScheme for Argon2Scheme {
    async fn hash(&self, password: &SecretString) -> Result<String, PasswordError> {
        let password = password.clone();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            Argon2::default()
                .hash_password(password.expose_secret().as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|err| PasswordError::Hash(err.to_string()))
        })
        .await?
    }

    async fn verify(&self, password: &SecretString, hash: &str) -> Result<bool, PasswordError> {
        let password = password.clone();
        let hash = hash.to_string();
        tokio::task::spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&hash).map_err(|err| PasswordError::MalformedHash(err.to_string()))?;
            Ok(Argon2::default()
                .verify_password(password.expose_secret().as_bytes(), &parsed)
                .is_ok())
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[tokio::test]
    async fn argon2_round_trip_matches_only_original() -> Result<()> {
        let scheme = Argon2Scheme;
        let hash = scheme.hash(&SecretString::from("longenough")).await?;
        assert!(hash.starts_with("$argon2"));
        assert!(scheme.verify(&SecretString::from("longenough"), &hash).await?);
        assert!(!scheme.verify(&SecretString::from("wrongpass"), &hash).await?);
        Ok(())
    }

    #[tokio::test]
    async fn argon2_salts_every_hash() -> Result<()> {
        let scheme = Argon2Scheme;
        let first = scheme.hash(&SecretString::from("longenough")).await?;
        let second = scheme.hash(&SecretString::from("longenough")).await?;
        assert_ne!(first, second);
        Ok(())
    }

    #[tokio::test]
    async fn malformed_hash_is_an_error() {
        let result = Argon2Scheme
            .verify(&SecretString::from("longenough"), "not-a-phc-string")
            .await;
        assert!(matches!(result, Err(PasswordError::MalformedHash(_))));
    }
}
