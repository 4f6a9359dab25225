//! Authentication orchestrator.
//!
//! [`Authenticator`] is constructed once with its collaborators and cloned
//! into request handlers. The public operations (`login`, `register`, `link`)
//! always settle into an [`AuthOutcome`]; the `try_*` variants expose the
//! typed [`AuthError`] for callers that want it.
//!
//! Public operations run on a spawned task, so a caller that goes away does
//! not cut a registration off between user creation and session issuance.

use chrono::Duration;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, field, instrument, Instrument, Span};
use uuid::Uuid;

use super::credentials::{check_shape, CredentialCheck, CredentialValidator, Credentials};
use super::linking::AccountLinker;
use super::model::NewUser;
use super::oauth::OAuthProviders;
use super::outcome::{AuthError, AuthOutcome};
use super::password::PasswordScheme;
use super::session::{IssuedSession, ResolvedSession, SessionIssuer};
use super::store::{IdentityStore, StoreError};

/// What the caller presented.
#[derive(Clone, Debug)]
pub enum AuthRequest {
    /// Provider callback: the named provider's authorization code.
    OAuth { provider: String, code: String },
    Credentials(Credentials),
}

#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn IdentityStore>,
    passwords: Arc<dyn PasswordScheme>,
    validator: CredentialValidator,
    providers: OAuthProviders,
    linker: AccountLinker,
    sessions: SessionIssuer,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn IdentityStore>,
        passwords: Arc<dyn PasswordScheme>,
        providers: OAuthProviders,
        session_ttl: Duration,
    ) -> Self {
        Self {
            validator: CredentialValidator::new(store.clone(), passwords.clone()),
            linker: AccountLinker::new(store.clone()),
            sessions: SessionIssuer::new(store.clone(), session_ttl),
            store,
            passwords,
            providers,
        }
    }

    #[must_use]
    pub fn providers(&self) -> &OAuthProviders {
        &self.providers
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.sessions.ttl()
    }

    /// Run `work` to completion on its own task and settle the result.
    async fn settle<F>(operation: &'static str, work: F) -> AuthOutcome
    where
        F: Future<Output = Result<IssuedSession, AuthError>> + Send + 'static,
    {
        let outcome = match tokio::spawn(work.in_current_span()).await {
            Ok(result) => AuthOutcome::settle(operation, result),
            Err(err) => {
                error!(operation, "auth task aborted: {err}");
                AuthOutcome::failed()
            }
        };
        Span::current().record("status", outcome.status.as_str());
        outcome
    }

    #[instrument(skip_all, fields(kind = request_kind(&request), status = field::Empty))]
    pub async fn login(&self, request: AuthRequest) -> AuthOutcome {
        let this = self.clone();
        Self::settle("login", async move { this.try_login(request).await }).await
    }

    #[instrument(skip_all, fields(kind = request_kind(&request), status = field::Empty))]
    pub async fn register(&self, request: AuthRequest) -> AuthOutcome {
        let this = self.clone();
        Self::settle("register", async move { this.try_register(request).await }).await
    }

    #[instrument(skip_all, fields(user_id = %user_id, provider = provider, status = field::Empty))]
    pub async fn link(&self, user_id: Uuid, provider: &str, code: &str) -> AuthOutcome {
        let this = self.clone();
        let provider = provider.to_string();
        let code = code.to_string();
        Self::settle("link", async move { this.try_link(user_id, &provider, &code).await }).await
    }

    /// # Errors
    /// Every failure is an [`AuthError`]; see [`AuthError::status`].
    pub async fn try_login(&self, request: AuthRequest) -> Result<IssuedSession, AuthError> {
        match request {
            AuthRequest::Credentials(credentials) => {
                match self.validator.check(&credentials).await? {
                    CredentialCheck::Malformed(violation) => {
                        Err(AuthError::MalformedInput(violation))
                    }
                    CredentialCheck::Invalid => Err(AuthError::NoSuchAccountOrBadCredentials),
                    CredentialCheck::Valid(user) => Ok(self.sessions.issue(&user, None).await?),
                }
            }
            AuthRequest::OAuth { provider, code } => self.federated(&provider, &code).await,
        }
    }

    /// # Errors
    /// Every failure is an [`AuthError`]; see [`AuthError::status`].
    pub async fn try_register(&self, request: AuthRequest) -> Result<IssuedSession, AuthError> {
        match request {
            AuthRequest::Credentials(credentials) => self.register_credentials(&credentials).await,
            AuthRequest::OAuth { provider, code } => self.federated(&provider, &code).await,
        }
    }

    /// # Errors
    /// Every failure is an [`AuthError`]; see [`AuthError::status`].
    pub async fn try_link(
        &self,
        user_id: Uuid,
        provider: &str,
        code: &str,
    ) -> Result<IssuedSession, AuthError> {
        let grant = self.providers.get(provider)?.exchange(code).await?;
        let account = self.linker.link(user_id, &grant).await?;
        let user = self
            .store
            .user_by_id(user_id)
            .await?
            .ok_or(StoreError::OrphanReference(user_id))?;
        Ok(self.sessions.issue(&user, Some(&account)).await?)
    }

    async fn federated(&self, provider: &str, code: &str) -> Result<IssuedSession, AuthError> {
        let grant = self.providers.get(provider)?.exchange(code).await?;
        let (user, account) = self.linker.sign_in(&grant).await?;
        Ok(self.sessions.issue(&user, Some(&account)).await?)
    }

    /// Check, then create, then issue. Each step finishes before the next
    /// starts; the store's unique index settles concurrent sign-ups.
    async fn register_credentials(
        &self,
        credentials: &Credentials,
    ) -> Result<IssuedSession, AuthError> {
        let email = check_shape(credentials).map_err(AuthError::MalformedInput)?;

        if self.store.user_by_email(&email).await?.is_some() {
            return Err(AuthError::AccountAlreadyExists);
        }

        let hash = self.passwords.hash(&credentials.password).await?;
        let user = match self
            .store
            .create_user(NewUser::with_password(email, hash))
            .await
        {
            Ok(user) => user,
            Err(StoreError::Conflict(_)) => return Err(AuthError::AccountAlreadyExists),
            Err(err) => return Err(err.into()),
        };
        debug!(user_id = %user.id, "user registered");

        // A failure past this point leaves the user in place; a retry then
        // reports user_exists and the caller signs in normally.
        Ok(self.sessions.issue(&user, None).await?)
    }

    /// Resolve a session token into its enriched view.
    ///
    /// # Errors
    /// Returns [`AuthError::StorageFault`] on store failures.
    pub async fn current_session(&self, token: &str) -> Result<Option<ResolvedSession>, AuthError> {
        Ok(self.sessions.resolve(token).await?)
    }

    /// # Errors
    /// Returns [`AuthError::StorageFault`] on store failures.
    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        Ok(self.sessions.revoke(token).await?)
    }
}

fn request_kind(request: &AuthRequest) -> &'static str {
    match request {
        AuthRequest::OAuth { .. } => "oauth",
        AuthRequest::Credentials(_) => "credentials",
    }
}
