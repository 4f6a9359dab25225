//! OAuth handshake plumbing.
//!
//! Starting a handshake stores a random `state` in a short-lived cookie and
//! sends the browser to the provider. The state carries the intent
//! (`login`, `register` or `link`) as a prefix so the callback knows which
//! orchestrator operation to run.

use axum::{
    extract::{Extension, Path, Query},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, error, warn};
use utoipa::IntoParams;

use super::{
    session::{cookie_value, extract_session_token, session_cookie, short_lived_cookie},
    status_response, AuthResponse,
};
use crate::api::state::AuthState;
use crate::identity::{session::generate_token, AuthOutcome, AuthRequest, AuthStatus};

pub const STATE_COOKIE_NAME: &str = "portcullis_oauth_state";
const STATE_COOKIE_MAX_AGE: i64 = 600;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    Login,
    Register,
    Link,
}

impl Intent {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Login => "login",
            Self::Register => "register",
            Self::Link => "link",
        }
    }

    fn from_state(state: &str) -> Option<Self> {
        let (intent, nonce) = state.split_once('.')?;
        if nonce.is_empty() {
            return None;
        }
        match intent {
            "login" => Some(Self::Login),
            "register" => Some(Self::Register),
            "link" => Some(Self::Link),
            _ => None,
        }
    }
}

#[derive(Deserialize, IntoParams, Debug, Default)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    /// Set by the provider when the user declined or the request was invalid.
    pub error: Option<String>,
}

/// Redirect the browser to `provider`'s consent page.
pub(crate) fn start(auth_state: &AuthState, provider: &str, intent: Intent) -> Response {
    let client = match auth_state.authenticator().providers().get(provider) {
        Ok(client) => client,
        Err(err) => {
            warn!(provider, "OAuth start rejected: {err}");
            return status_response(AuthStatus::Failed, HeaderMap::new());
        }
    };

    let state = match generate_token() {
        Ok(nonce) => format!("{}.{nonce}", intent.as_str()),
        Err(err) => {
            error!("Failed to generate OAuth state: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let url = match client.authorize_url(&state) {
        Ok(url) => url,
        Err(err) => {
            warn!(provider, "Failed to build authorize url: {err}");
            return status_response(AuthStatus::Failed, HeaderMap::new());
        }
    };

    let mut headers = HeaderMap::new();
    match (
        HeaderValue::from_str(url.as_str()),
        short_lived_cookie(
            auth_state.config(),
            STATE_COOKIE_NAME,
            &state,
            STATE_COOKIE_MAX_AGE,
        ),
    ) {
        (Ok(location), Ok(cookie)) => {
            headers.insert(LOCATION, location);
            headers.insert(SET_COOKIE, cookie);
        }
        _ => {
            error!("Failed to build OAuth redirect headers");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    debug!(provider, intent = intent.as_str(), "OAuth handshake started");
    (StatusCode::SEE_OTHER, headers).into_response()
}

#[utoipa::path(
    get,
    path = "/auth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Provider name, e.g. google"),
        CallbackQuery
    ),
    responses(
        (status = 303, description = "Signed in, redirected home"),
        (status = 401, description = "Handshake failed", body = AuthResponse),
        (status = 409, description = "Account already exists", body = AuthResponse)
    ),
    tag = "auth"
)]
pub async fn callback(
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = short_lived_cookie(auth_state.config(), STATE_COOKIE_NAME, "", 0) {
        response_headers.append(SET_COOKIE, cookie);
    }

    let expected = cookie_value(&headers, STATE_COOKIE_NAME);
    let (Some(state), Some(expected)) = (query.state.as_deref(), expected) else {
        debug!(provider = %provider, "OAuth callback without state");
        return status_response(AuthStatus::Failed, response_headers);
    };
    if state != expected {
        debug!(provider = %provider, "OAuth callback state mismatch");
        return status_response(AuthStatus::Failed, response_headers);
    }
    let Some(intent) = Intent::from_state(state) else {
        return status_response(AuthStatus::Failed, response_headers);
    };

    if let Some(error) = query.error.as_deref() {
        warn!(provider = %provider, "Provider returned error: {error}");
        return status_response(AuthStatus::Failed, response_headers);
    }
    let Some(code) = query.code.filter(|code| !code.is_empty()) else {
        return status_response(AuthStatus::Failed, response_headers);
    };

    let authenticator = auth_state.authenticator();
    let outcome = match intent {
        Intent::Login => {
            authenticator
                .login(AuthRequest::OAuth { provider, code })
                .await
        }
        Intent::Register => {
            authenticator
                .register(AuthRequest::OAuth { provider, code })
                .await
        }
        Intent::Link => {
            let current = match extract_session_token(&headers) {
                Some(token) => authenticator.current_session(&token).await,
                None => Ok(None),
            };
            match current {
                Ok(Some(resolved)) => authenticator.link(resolved.user.id, &provider, &code).await,
                Ok(None) => AuthOutcome::failed(),
                Err(err) => {
                    error!("Failed to lookup session: {err}");
                    AuthOutcome::failed()
                }
            }
        }
    };

    match outcome.session {
        Some(session) if outcome.status == AuthStatus::Success => {
            match session_cookie(auth_state.config(), session.token()) {
                Ok(cookie) => {
                    response_headers.append(SET_COOKIE, cookie);
                }
                Err(err) => {
                    error!("Failed to build session cookie: {err}");
                    return status_response(AuthStatus::Failed, response_headers);
                }
            }
            match HeaderValue::from_str(auth_state.config().home_path()) {
                Ok(location) => {
                    response_headers.insert(LOCATION, location);
                    (StatusCode::SEE_OTHER, response_headers).into_response()
                }
                Err(_) => status_response(AuthStatus::Success, response_headers),
            }
        }
        _ => status_response(outcome.status, response_headers),
    }
}
