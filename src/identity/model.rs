//! Identity records as stored, plus the tagged grant types that flow through
//! sign-in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

/// Durable identity record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
}

/// Fields required to create a user; the store assigns the id.
#[derive(Clone, Debug, Default)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub email_verified: Option<DateTime<Utc>>,
}

impl NewUser {
    #[must_use]
    pub fn with_password(email: String, password_hash: String) -> Self {
        Self {
            email,
            password_hash: Some(password_hash),
            ..Self::default()
        }
    }
}

/// Grant type recorded in the `accounts.type` column.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    #[serde(rename = "oauth")]
    OAuth,
    Oidc,
}

impl AccountKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OAuth => "oauth",
            Self::Oidc => "oidc",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "oauth" => Ok(Self::OAuth),
            "oidc" => Ok(Self::Oidc),
            other => Err(format!("unknown account type: {other}")),
        }
    }
}

/// Provider token bundle as returned by the token endpoint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
}

/// A federated account owned by exactly one user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkedAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: AccountKind,
    pub provider: String,
    pub provider_account_id: String,
    pub tokens: ProviderTokens,
    pub session_state: Option<String>,
}

impl LinkedAccount {
    /// Rebuild the federated grant this account was created from.
    #[must_use]
    pub fn grant(&self) -> FederatedGrant {
        FederatedGrant {
            kind: self.kind,
            provider: self.provider.clone(),
            provider_account_id: self.provider_account_id.clone(),
            tokens: self.tokens.clone(),
            session_state: self.session_state.clone(),
        }
    }
}

/// What a provider hands back after a successful exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FederatedGrant {
    pub kind: AccountKind,
    pub provider: String,
    pub provider_account_id: String,
    pub tokens: ProviderTokens,
    pub session_state: Option<String>,
}

/// How a session was authenticated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountGrant {
    /// Email and password checked against the stored hash.
    Local,
    /// Third-party provider exchange.
    Federated(FederatedGrant),
}

/// Server-tracked login instance. Only the token hash is persisted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: Uuid,
    pub token_hash: Vec<u8>,
    pub user_id: Uuid,
    pub account_id: Option<Uuid>,
    pub expires: DateTime<Utc>,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }
}

#[derive(Clone, Debug)]
pub struct NewSession {
    pub token_hash: Vec<u8>,
    pub user_id: Uuid,
    pub account_id: Option<Uuid>,
    pub expires: DateTime<Utc>,
}

/// Short-lived token keyed by `(identifier, token_hash)`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationToken {
    pub identifier: String,
    pub token_hash: Vec<u8>,
    pub expires: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn account_kind_parses_column_values() {
        assert_eq!("oauth".parse::<AccountKind>(), Ok(AccountKind::OAuth));
        assert_eq!("oidc".parse::<AccountKind>(), Ok(AccountKind::Oidc));
        assert!("email".parse::<AccountKind>().is_err());
        assert_eq!(AccountKind::OAuth.to_string(), "oauth");
    }

    #[test]
    fn account_kind_serializes_lowercase() -> anyhow::Result<()> {
        assert_eq!(serde_json::to_string(&AccountKind::OAuth)?, "\"oauth\"");
        assert_eq!(serde_json::to_string(&AccountKind::Oidc)?, "\"oidc\"");
        Ok(())
    }

    #[test]
    fn session_expiry_is_inclusive() {
        let now = Utc::now();
        let session = Session {
            id: Uuid::nil(),
            token_hash: vec![1],
            user_id: Uuid::nil(),
            account_id: None,
            expires: now,
        };
        assert!(session.is_expired(now));
        assert!(!session.is_expired(now - Duration::seconds(1)));
    }

    #[test]
    fn linked_account_grant_keeps_provider_identity() {
        let account = LinkedAccount {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            kind: AccountKind::Oidc,
            provider: "google".to_string(),
            provider_account_id: "1234".to_string(),
            tokens: ProviderTokens {
                access_token: Some("at".to_string()),
                ..ProviderTokens::default()
            },
            session_state: None,
        };
        let grant = account.grant();
        assert_eq!(grant.provider, "google");
        assert_eq!(grant.provider_account_id, "1234");
        assert_eq!(grant.tokens.access_token.as_deref(), Some("at"));
    }
}
