//! Result states and the fault taxonomy of the auth orchestrator.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::credentials::{CredentialFault, ShapeViolation};
use super::oauth::OAuthError;
use super::password::PasswordError;
use super::session::{IssuedSession, SessionError};
use super::store::StoreError;

/// `idle → in_progress → {success | failed | invalid_data | user_exists}`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuthStatus {
    Idle,
    InProgress,
    Success,
    Failed,
    InvalidData,
    UserExists,
}

impl AuthStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::InProgress => "in_progress",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::InvalidData => "invalid_data",
            Self::UserExists => "user_exists",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Idle | Self::InProgress)
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed input: {0:?}")]
    MalformedInput(ShapeViolation),
    #[error("no such account or bad credentials")]
    NoSuchAccountOrBadCredentials,
    #[error("account already exists")]
    AccountAlreadyExists,
    #[error("provider account is not linked to the user owning its email")]
    AccountNotLinked,
    #[error("provider account is linked to another user")]
    AccountLinkedElsewhere,
    #[error("upstream authentication failed: {0}")]
    UpstreamAuthFailure(#[from] OAuthError),
    #[error("storage fault: {0}")]
    StorageFault(#[from] StoreError),
    #[error("hashing fault: {0}")]
    HashingFault(#[from] PasswordError),
    #[error("session issuance failed: {0}")]
    IssuanceFault(SessionError),
}

impl From<CredentialFault> for AuthError {
    fn from(fault: CredentialFault) -> Self {
        match fault {
            CredentialFault::Store(err) => Self::StorageFault(err),
            CredentialFault::Password(err) => Self::HashingFault(err),
        }
    }
}

impl From<SessionError> for AuthError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Store(err) => Self::StorageFault(err),
            other => Self::IssuanceFault(other),
        }
    }
}

impl AuthError {
    /// The only thing callers ever see of a fault.
    #[must_use]
    pub const fn status(&self) -> AuthStatus {
        match self {
            Self::MalformedInput(_) => AuthStatus::InvalidData,
            Self::AccountAlreadyExists => AuthStatus::UserExists,
            Self::NoSuchAccountOrBadCredentials
            | Self::AccountNotLinked
            | Self::AccountLinkedElsewhere
            | Self::UpstreamAuthFailure(_)
            | Self::StorageFault(_)
            | Self::HashingFault(_)
            | Self::IssuanceFault(_) => AuthStatus::Failed,
        }
    }

    /// Emit at a level matching the fault class. Infrastructure trouble is an
    /// error; user mistakes are not.
    pub fn log(&self, operation: &str) {
        match self {
            Self::StorageFault(_) | Self::HashingFault(_) | Self::IssuanceFault(_) => {
                error!(operation, "{self}");
            }
            Self::UpstreamAuthFailure(_) => warn!(operation, "{self}"),
            Self::AccountNotLinked | Self::AccountLinkedElsewhere => info!(operation, "{self}"),
            Self::MalformedInput(_)
            | Self::NoSuchAccountOrBadCredentials
            | Self::AccountAlreadyExists => debug!(operation, "{self}"),
        }
    }
}

/// Settled result of a public orchestrator call.
#[derive(Clone, Debug)]
pub struct AuthOutcome {
    pub status: AuthStatus,
    pub session: Option<IssuedSession>,
}

impl AuthOutcome {
    #[must_use]
    pub fn failed() -> Self {
        Self {
            status: AuthStatus::Failed,
            session: None,
        }
    }

    /// Collapse a result into a terminal state, logging the fault.
    #[must_use]
    pub fn settle(operation: &str, result: Result<IssuedSession, AuthError>) -> Self {
        match result {
            Ok(session) => Self {
                status: AuthStatus::Success,
                session: Some(session),
            },
            Err(err) => {
                err.log(operation);
                Self {
                    status: err.status(),
                    session: None,
                }
            }
        }
    }
}
