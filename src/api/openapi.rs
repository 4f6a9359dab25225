use super::handlers::{
    accounts, forms, health, oauth, pages, session, verification, AuthResponse,
};
use crate::identity::{claims::SessionUser, AuthStatus, SessionShell};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        pages::landing,
        pages::dashboard,
        forms::login_page,
        forms::login,
        forms::register_page,
        forms::register,
        oauth::callback,
        session::session,
        session::logout,
        accounts::link,
        verification::request_verification,
        verification::verify_email,
    ),
    components(schemas(
        AuthStatus,
        AuthResponse,
        SessionShell,
        SessionUser,
        forms::AuthForm,
        accounts::LinkRequest,
        verification::VerificationRequest,
        verification::VerifyEmailRequest,
        health::Health,
        pages::Landing,
    )),
    tags(
        (name = "auth", description = "Credential and OAuth sign in"),
        (name = "session", description = "Session inspection, logout and account linking"),
        (name = "verification", description = "Email verification"),
        (name = "pages", description = "Gated navigations"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// The generated document, with package metadata from Cargo.
#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();
    doc.info.title = env!("CARGO_PKG_NAME").to_string();
    doc.info.version = env!("CARGO_PKG_VERSION").to_string();
    doc.info.description = Some(env!("CARGO_PKG_DESCRIPTION").to_string());
    doc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = openapi();
        for path in [
            "/health",
            "/",
            "/dashboard",
            "/login",
            "/register",
            "/auth/{provider}/callback",
            "/api/session",
            "/api/logout",
            "/api/accounts/link",
            "/api/verification",
            "/api/verify-email",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        assert_eq!(doc.info.title, env!("CARGO_PKG_NAME"));
    }
}
