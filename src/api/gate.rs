//! Route gate: runs the access policy before every page handler.

use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{handlers::session::extract_session_token, state::AuthState};
use crate::identity::Decision;

pub const LOGIN_PATH: &str = "/login";

/// Resolve the caller's session, ask the policy, and act on its decision.
///
/// On `Allow` with a live session the [`ResolvedSession`](crate::identity::ResolvedSession)
/// is stored in the request extensions for the page handler. A store fault
/// is logged and the caller is treated as signed out.
pub async fn gate(
    Extension(auth_state): Extension<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = match extract_session_token(request.headers()) {
        Some(token) => match auth_state.authenticator().current_session(&token).await {
            Ok(resolved) => resolved,
            Err(err) => {
                error!("Failed to lookup session: {err}");
                None
            }
        },
        None => None,
    };

    let path = request.uri().path().to_string();
    let decision = auth_state.policy().decide(resolved.is_some(), &path);
    debug!(path = %path, ?decision, "access decision");

    match decision {
        Decision::Allow => {
            if let Some(resolved) = resolved {
                request.extensions_mut().insert(resolved);
            }
            next.run(request).await
        }
        Decision::Deny => Redirect::to(LOGIN_PATH).into_response(),
        Decision::Redirect(to) => Redirect::to(&to).into_response(),
    }
}
