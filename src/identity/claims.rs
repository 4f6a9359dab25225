//! Session enrichment.
//!
//! Two transforms run on every issuance and every read:
//!
//! 1. [`assemble`] turns the authenticated user and the grant into
//!    [`SessionClaims`]. The user's own id is always carried; provider tokens
//!    only for federated grants.
//! 2. [`project`] copies claims into a [`SessionShell`]. It is pure, so
//!    projecting the same claims twice yields the same shell.
//!
//! The id placed in a session is always `users.id`, never the provider's
//! account id, so several providers resolve to one identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::model::{AccountGrant, User};

/// Enriched, never-persisted session payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

#[must_use]
pub fn assemble(user: &User, grant: &AccountGrant) -> SessionClaims {
    match grant {
        AccountGrant::Local => SessionClaims {
            user_id: user.id,
            access_token: None,
            refresh_token: None,
        },
        AccountGrant::Federated(federated) => SessionClaims {
            user_id: user.id,
            access_token: federated.tokens.access_token.clone(),
            refresh_token: federated.tokens.refresh_token.clone(),
        },
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionUser {
    pub id: Option<Uuid>,
    pub email: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

/// Session container as handed to clients.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct SessionShell {
    pub user: SessionUser,
    pub expires: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl SessionShell {
    /// Shell carrying only the profile fields; identity comes from claims.
    #[must_use]
    pub fn for_user(user: &User, expires: DateTime<Utc>) -> Self {
        Self {
            user: SessionUser {
                id: None,
                email: user.email.clone(),
                name: user.name.clone(),
                image: user.image.clone(),
            },
            expires: Some(expires),
            access_token: None,
            refresh_token: None,
        }
    }
}

#[must_use]
pub fn project(claims: &SessionClaims, mut shell: SessionShell) -> SessionShell {
    shell.user.id = Some(claims.user_id);
    shell.access_token.clone_from(&claims.access_token);
    shell.refresh_token.clone_from(&claims.refresh_token);
    shell
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::model::{AccountKind, FederatedGrant, ProviderTokens};

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            email: "a@b.com".to_string(),
            password_hash: None,
            name: Some("A".to_string()),
            image: None,
            email_verified: None,
        }
    }

    fn federated() -> AccountGrant {
        AccountGrant::Federated(FederatedGrant {
            kind: AccountKind::OAuth,
            provider: "google".to_string(),
            provider_account_id: "provider-opaque-id".to_string(),
            tokens: ProviderTokens {
                access_token: Some("at".to_string()),
                refresh_token: Some("rt".to_string()),
                ..ProviderTokens::default()
            },
            session_state: None,
        })
    }

    #[test]
    fn local_grant_never_carries_provider_tokens() {
        let user = user();
        let claims = assemble(&user, &AccountGrant::Local);
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.access_token, None);
        assert_eq!(claims.refresh_token, None);
    }

    #[test]
    fn federated_grant_carries_tokens_and_user_id() {
        let user = user();
        let claims = assemble(&user, &federated());
        assert_eq!(claims.user_id, user.id);
        assert_eq!(claims.access_token.as_deref(), Some("at"));
        assert_eq!(claims.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn projection_uses_canonical_user_id() {
        let user = user();
        let claims = assemble(&user, &federated());
        let shell = project(&claims, SessionShell::for_user(&user, Utc::now()));
        assert_eq!(shell.user.id, Some(user.id));
        assert_ne!(
            shell.user.id.map(|id| id.to_string()),
            Some("provider-opaque-id".to_string())
        );
    }

    #[test]
    fn projection_is_idempotent() {
        let user = user();
        let claims = assemble(&user, &federated());
        let once = project(&claims, SessionShell::for_user(&user, Utc::now()));
        let twice = project(&claims, once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn projection_clears_stale_tokens_for_local_claims() {
        let user = user();
        let stale = project(
            &assemble(&user, &federated()),
            SessionShell::for_user(&user, Utc::now()),
        );
        let local = project(&assemble(&user, &AccountGrant::Local), stale);
        assert_eq!(local.access_token, None);
        assert_eq!(local.refresh_token, None);
    }

    #[test]
    fn shell_omits_absent_tokens_when_serialized() -> anyhow::Result<()> {
        let user = user();
        let shell = project(
            &assemble(&user, &AccountGrant::Local),
            SessionShell::for_user(&user, Utc::now()),
        );
        let value = serde_json::to_value(&shell)?;
        assert!(value.get("access_token").is_none());
        assert_eq!(
            value.pointer("/user/email").and_then(serde_json::Value::as_str),
            Some("a@b.com")
        );
        Ok(())
    }
}
