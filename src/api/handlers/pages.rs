use axum::{
    extract::Extension,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::state::AuthState;
use crate::identity::{ResolvedSession, SessionShell};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Landing {
    name: String,
    version: String,
    providers: Vec<String>,
}

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Public landing page", body = Landing)),
    tag = "pages"
)]
pub async fn landing(auth_state: Extension<Arc<AuthState>>) -> impl IntoResponse {
    Json(Landing {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers: auth_state
            .authenticator()
            .providers()
            .names()
            .map(str::to_string)
            .collect(),
    })
}

/// The gate has already resolved the session; render its shell.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Signed-in view", body = SessionShell),
        (status = 303, description = "Not signed in")
    ),
    tag = "pages"
)]
pub async fn dashboard(session: Option<Extension<ResolvedSession>>) -> Response {
    match session {
        Some(Extension(resolved)) => Json(resolved.shell).into_response(),
        None => Redirect::to("/login").into_response(),
    }
}
