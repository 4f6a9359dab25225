use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;
use utoipa_swagger_ui::SwaggerUi;

use self::handlers::{accounts, forms, health, oauth, pages, session, verification};
use self::state::AuthState;

pub mod gate;
pub mod handlers;
pub mod state;
// OpenAPI document for every route served below.
mod openapi;


pub use openapi::openapi;

/// Build the application router.
///
/// Page routes pass through [`gate::gate`]; the JSON API, health and docs
/// routes do not.
pub fn router(auth_state: Arc<AuthState>) -> Router {
    let pages = Router::new()
        .route("/", get(pages::landing))
        .route("/login", get(forms::login_page).post(forms::login))
        .route("/register", get(forms::register_page).post(forms::register))
        .route("/dashboard", get(pages::dashboard))
        .route("/dashboard/*rest", get(pages::dashboard))
        .route("/auth/:provider/callback", get(oauth::callback))
        .route_layer(middleware::from_fn(gate::gate));

    let api = Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/api/session", get(session::session))
        .route("/api/logout", post(session::logout))
        .route("/api/accounts/link", post(accounts::link))
        .route("/api/verification", post(verification::request_verification))
        .route("/api/verify-email", post(verification::verify_email));

    Router::new()
        .merge(pages)
        .merge(api)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi()))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(auth_state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, auth_state: Arc<AuthState>) -> Result<()> {
    let app = router(auth_state);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        // Without a signal handler keep serving until the process is killed.
        error!("Failed to listen for shutdown signal: {err}");
        std::future::pending::<()>().await;
    }
    info!("Gracefully shutdown");
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
