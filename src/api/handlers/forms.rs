use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::{
    oauth::{self, Intent},
    session::session_cookie,
    status_response, AuthResponse,
};
use crate::api::state::AuthState;
use crate::identity::{oauth::google, AuthOutcome, AuthRequest, AuthStatus, Credentials};

/// Form fields posted by the login and register pages.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct AuthForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    /// `google` selects the OAuth path; anything else uses the credentials.
    #[serde(default)]
    pub provider: Option<String>,
}

impl AuthForm {
    fn wants_oauth(&self) -> bool {
        self.provider.as_deref() == Some(google::PROVIDER)
    }
}

#[utoipa::path(
    get,
    path = "/login",
    responses((status = 200, description = "Form is idle", body = AuthResponse)),
    tag = "auth"
)]
pub async fn login_page() -> impl IntoResponse {
    Json(AuthResponse {
        status: AuthStatus::Idle,
    })
}

#[utoipa::path(
    get,
    path = "/register",
    responses((status = 200, description = "Form is idle", body = AuthResponse)),
    tag = "auth"
)]
pub async fn register_page() -> impl IntoResponse {
    Json(AuthResponse {
        status: AuthStatus::Idle,
    })
}

#[utoipa::path(
    post,
    path = "/login",
    request_body(content = AuthForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 303, description = "Redirect to the OAuth provider"),
        (status = 400, description = "Malformed email or password", body = AuthResponse),
        (status = 401, description = "Sign in failed", body = AuthResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    auth_state: Extension<Arc<AuthState>>,
    Form(form): Form<AuthForm>,
) -> Response {
    if form.wants_oauth() {
        return oauth::start(&auth_state, google::PROVIDER, Intent::Login);
    }
    let request = AuthRequest::Credentials(Credentials::new(form.email, form.password));
    let outcome = auth_state.authenticator().login(request).await;
    respond(&auth_state, outcome)
}

#[utoipa::path(
    post,
    path = "/register",
    request_body(content = AuthForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Registered and signed in", body = AuthResponse),
        (status = 303, description = "Redirect to the OAuth provider"),
        (status = 400, description = "Malformed email or password", body = AuthResponse),
        (status = 401, description = "Registration failed", body = AuthResponse),
        (status = 409, description = "Account already exists", body = AuthResponse)
    ),
    tag = "auth"
)]
pub async fn register(
    auth_state: Extension<Arc<AuthState>>,
    Form(form): Form<AuthForm>,
) -> Response {
    if form.wants_oauth() {
        return oauth::start(&auth_state, google::PROVIDER, Intent::Register);
    }
    let request = AuthRequest::Credentials(Credentials::new(form.email, form.password));
    let outcome = auth_state.authenticator().register(request).await;
    respond(&auth_state, outcome)
}

fn respond(auth_state: &AuthState, outcome: AuthOutcome) -> Response {
    let mut headers = HeaderMap::new();
    if let Some(session) = outcome.session.as_ref() {
        match session_cookie(auth_state.config(), session.token()) {
            Ok(cookie) => {
                headers.insert(SET_COOKIE, cookie);
            }
            Err(err) => {
                error!("Failed to build session cookie: {err}");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        }
    }
    status_response(outcome.status, headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_google_selects_oauth() {
        let mut form = AuthForm::default();
        assert!(!form.wants_oauth());
        form.provider = Some("github".to_string());
        assert!(!form.wants_oauth());
        form.provider = Some("google".to_string());
        assert!(form.wants_oauth());
    }
}
