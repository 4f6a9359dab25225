//! Email verification endpoints.
//!
//! Issuing always answers `202 Accepted` so the response does not reveal
//! whether the address belongs to an account.

use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::api::state::AuthState;
use crate::identity::VerifyOutcome;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerificationRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub email: String,
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/api/verification",
    request_body = VerificationRequest,
    responses(
        (status = 202, description = "Verification email queued when the account exists"),
        (status = 500, description = "Token could not be issued")
    ),
    tag = "verification"
)]
pub async fn request_verification(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<VerificationRequest>,
) -> impl IntoResponse {
    match auth_state.verifications().issue(&request.email).await {
        Ok(()) => StatusCode::ACCEPTED,
        Err(err) => {
            error!("Failed to issue verification token: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Invalid or expired token")
    ),
    tag = "verification"
)]
pub async fn verify_email(
    auth_state: Extension<Arc<AuthState>>,
    Json(request): Json<VerifyEmailRequest>,
) -> impl IntoResponse {
    match auth_state
        .verifications()
        .redeem(&request.email, request.token.trim())
        .await
    {
        Ok(VerifyOutcome::Verified) => StatusCode::NO_CONTENT,
        Ok(VerifyOutcome::Invalid) => StatusCode::BAD_REQUEST,
        Err(err) => {
            error!("Failed to redeem verification token: {err}");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
