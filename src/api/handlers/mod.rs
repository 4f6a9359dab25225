pub mod accounts;
pub mod forms;
pub mod health;
pub mod oauth;
pub mod pages;
pub mod session;
pub mod verification;

// common helpers for the handlers
use axum::{
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::identity::AuthStatus;

/// Body of every login/register answer.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthResponse {
    pub status: AuthStatus,
}

#[must_use]
pub const fn status_code(status: AuthStatus) -> StatusCode {
    match status {
        AuthStatus::Idle | AuthStatus::InProgress | AuthStatus::Success => StatusCode::OK,
        AuthStatus::InvalidData => StatusCode::BAD_REQUEST,
        AuthStatus::Failed => StatusCode::UNAUTHORIZED,
        AuthStatus::UserExists => StatusCode::CONFLICT,
    }
}

pub(crate) fn status_response(status: AuthStatus, headers: HeaderMap) -> Response {
    (status_code(status), headers, Json(AuthResponse { status })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_terminal_status_has_a_distinct_code() {
        assert_eq!(status_code(AuthStatus::Success), StatusCode::OK);
        assert_eq!(status_code(AuthStatus::InvalidData), StatusCode::BAD_REQUEST);
        assert_eq!(status_code(AuthStatus::Failed), StatusCode::UNAUTHORIZED);
        assert_eq!(status_code(AuthStatus::UserExists), StatusCode::CONFLICT);
    }

    #[test]
    fn response_body_uses_snake_case() -> anyhow::Result<()> {
        let body = serde_json::to_string(&AuthResponse {
            status: AuthStatus::InvalidData,
        })?;
        assert_eq!(body, r#"{"status":"invalid_data"}"#);
        Ok(())
    }
}
