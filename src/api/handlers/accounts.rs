use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use super::{
    oauth::{self, Intent},
    session::extract_session_token,
};
use crate::api::state::AuthState;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LinkRequest {
    pub provider: String,
}

#[utoipa::path(
    post,
    path = "/api/accounts/link",
    request_body = LinkRequest,
    responses(
        (status = 303, description = "Redirect to the provider consent page"),
        (status = 401, description = "No active session or unknown provider")
    ),
    tag = "session"
)]
pub async fn link(
    headers: HeaderMap,
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<LinkRequest>,
) -> Response {
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };
    match auth_state.authenticator().current_session(&token).await {
        Ok(Some(_)) => oauth::start(&auth_state, &request.provider, Intent::Link),
        Ok(None) => StatusCode::UNAUTHORIZED.into_response(),
        Err(err) => {
            error!("Failed to lookup session: {err}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
