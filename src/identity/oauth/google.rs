//! Google sign-in over the authorization-code flow.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use super::{OAuthClient, OAuthError, OAuthGrant, ProviderProfile};
use crate::identity::model::{AccountKind, FederatedGrant, ProviderTokens};

pub const PROVIDER: &str = "google";

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/adwords openid \
     https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";

#[derive(Clone, Debug)]
pub struct GoogleConfig {
    client_id: String,
    client_secret: SecretString,
    redirect_url: String,
    scope: String,
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
}

impl GoogleConfig {
    #[must_use]
    pub fn new(client_id: String, client_secret: SecretString, redirect_url: String) -> Self {
        Self {
            client_id,
            client_secret,
            redirect_url,
            scope: DEFAULT_SCOPE.to_string(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            userinfo_url: USERINFO_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: String) -> Self {
        self.scope = scope;
        self
    }

    /// Override provider endpoints, e.g. for a local mock.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        authorize_url: String,
        token_url: String,
        userinfo_url: String,
    ) -> Self {
        self.authorize_url = authorize_url;
        self.token_url = token_url;
        self.userinfo_url = userinfo_url;
        self
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    #[must_use]
    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }

    #[must_use]
    pub fn scope(&self) -> &str {
        &self.scope
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
    scope: Option<String>,
    token_type: Option<String>,
    id_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

pub struct GoogleClient {
    config: GoogleConfig,
    http: Client,
}

impl GoogleClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GoogleConfig) -> Result<Self, OAuthError> {
        let http = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .build()?;
        Ok(Self { config, http })
    }

    async fn fetch_tokens(&self, code: &str) -> Result<TokenResponse, OAuthError> {
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret()),
            ("redirect_uri", self.config.redirect_url.as_str()),
        ];
        let response = self
            .http
            .post(&self.config.token_url)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = match response.json::<TokenErrorResponse>().await {
                Ok(body) => match body.error_description {
                    Some(description) => format!("{}: {description}", body.error),
                    None => body.error,
                },
                Err(_) => status.to_string(),
            };
            return Err(OAuthError::Rejected(reason));
        }

        Ok(response.json().await?)
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<UserInfo, OAuthError> {
        let response = self
            .http
            .get(&self.config.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(OAuthError::Rejected(format!(
                "userinfo returned {}",
                response.status()
            )));
        }

        Ok(response.json().await?)
    }
}

fn grant_from(tokens: TokenResponse, info: UserInfo) -> Result<OAuthGrant, OAuthError> {
    if info.sub.trim().is_empty() {
        return Err(OAuthError::MissingField("sub"));
    }
    // Google is an OpenID provider; the presence of an id_token marks the grant as such.
    let kind = if tokens.id_token.is_some() {
        AccountKind::Oidc
    } else {
        AccountKind::OAuth
    };
    let expires_at = tokens
        .expires_in
        .map(|seconds| Utc::now() + Duration::seconds(seconds));

    Ok(OAuthGrant {
        profile: ProviderProfile {
            email: info.email,
            email_verified: info.email_verified,
            name: info.name,
            image: info.picture,
        },
        account: FederatedGrant {
            kind,
            provider: PROVIDER.to_string(),
            provider_account_id: info.sub,
            tokens: ProviderTokens {
                access_token: Some(tokens.access_token),
                refresh_token: tokens.refresh_token,
                id_token: tokens.id_token,
                expires_at,
                token_type: tokens.token_type,
                scope: tokens.scope,
            },
            session_state: None,
        },
    })
}

#[async_trait]
impl OAuthClient for GoogleClient {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn authorize_url(&self, state: &str) -> Result<Url, OAuthError> {
        Ok(Url::parse_with_params(
            &self.config.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_url.as_str()),
                ("scope", self.config.scope.as_str()),
                ("state", state),
                ("prompt", "select_account"),
                ("access_type", "offline"),
            ],
        )?)
    }

    #[instrument(skip_all, fields(provider = PROVIDER))]
    async fn exchange(&self, code: &str) -> Result<OAuthGrant, OAuthError> {
        if code.trim().is_empty() {
            return Err(OAuthError::MissingField("code"));
        }
        let tokens = self.fetch_tokens(code).await?;
        let info = self.fetch_profile(&tokens.access_token).await?;
        debug!("google exchange completed");
        grant_from(tokens, info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    fn client() -> Result<GoogleClient> {
        Ok(GoogleClient::new(GoogleConfig::new(
            "client-123".to_string(),
            SecretString::from("shh"),
            "https://app.test/auth/google/callback".to_string(),
        ))?)
    }

    #[test]
    fn authorize_url_requests_offline_access_and_account_picker() -> Result<()> {
        let url = client()?.authorize_url("login.abc")?;
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        let get = |name: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };
        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(get("client_id"), Some("client-123"));
        assert_eq!(get("state"), Some("login.abc"));
        assert_eq!(get("prompt"), Some("select_account"));
        assert_eq!(get("access_type"), Some("offline"));
        assert_eq!(get("response_type"), Some("code"));
        assert_eq!(get("scope"), Some(DEFAULT_SCOPE));
        assert!(!url.as_str().contains("shh"));
        Ok(())
    }

    #[test]
    fn config_overrides_scope() {
        let config = GoogleConfig::new(
            "id".to_string(),
            SecretString::from("secret"),
            "https://app.test/cb".to_string(),
        )
        .with_scope("openid email".to_string());
        assert_eq!(config.scope(), "openid email");
        assert_eq!(config.redirect_url(), "https://app.test/cb");
    }

    #[test]
    fn grant_from_maps_tokens_and_profile() -> Result<()> {
        let grant = grant_from(
            TokenResponse {
                access_token: "at".to_string(),
                expires_in: Some(3600),
                refresh_token: Some("rt".to_string()),
                scope: Some("openid".to_string()),
                token_type: Some("Bearer".to_string()),
                id_token: Some("idt".to_string()),
            },
            UserInfo {
                sub: "10769150350006150715113082367".to_string(),
                email: Some("a@b.com".to_string()),
                email_verified: true,
                name: Some("A".to_string()),
                picture: None,
            },
        )?;
        assert_eq!(grant.account.kind, AccountKind::Oidc);
        assert_eq!(grant.account.provider, PROVIDER);
        assert_eq!(grant.account.tokens.refresh_token.as_deref(), Some("rt"));
        assert!(grant.account.tokens.expires_at.is_some());
        assert!(grant.profile.email_verified);
        Ok(())
    }

    #[test]
    fn grant_from_requires_subject() {
        let result = grant_from(
            TokenResponse {
                access_token: "at".to_string(),
                expires_in: None,
                refresh_token: None,
                scope: None,
                token_type: None,
                id_token: None,
            },
            UserInfo {
                sub: " ".to_string(),
                email: None,
                email_verified: false,
                name: None,
                picture: None,
            },
        );
        assert!(matches!(result, Err(OAuthError::MissingField("sub"))));
    }

    #[tokio::test]
    async fn empty_code_is_rejected_without_network() -> Result<()> {
        let result = client()?.exchange("").await;
        assert!(matches!(result, Err(OAuthError::MissingField("code"))));
        Ok(())
    }
}
