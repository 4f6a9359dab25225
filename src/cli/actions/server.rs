use crate::{
    api::{self, state::AuthConfig},
    cli::{commands::oauth::GoogleOptions, telemetry},
    identity::{
        oauth::{GoogleClient, GoogleConfig, OAuthProviders},
        password::Argon2Scheme,
        store::PgIdentityStore,
        verification::LogVerificationSender,
    },
};
use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub apply_schema: bool,
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub verification_token_ttl_seconds: i64,
    pub home_path: String,
    pub google: Option<GoogleOptions>,
}

fn google_client(google: GoogleOptions, frontend_base_url: &str) -> Result<GoogleClient> {
    let redirect_url = google.redirect_url.unwrap_or_else(|| {
        format!(
            "{}/auth/google/callback",
            frontend_base_url.trim_end_matches('/')
        )
    });
    let config = GoogleConfig::new(google.client_id, google.client_secret, redirect_url)
        .with_scope(google.scope);
    GoogleClient::new(config).context("Failed to build Google OAuth client")
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the schema cannot be
/// applied, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let store = PgIdentityStore::new(pool);
    if args.apply_schema {
        store
            .apply_schema()
            .await
            .context("Failed to apply database schema")?;
        info!("Database schema applied");
    }

    let mut providers = OAuthProviders::new();
    if let Some(google) = args.google {
        providers = providers.with_client(Arc::new(google_client(google, &args.frontend_base_url)?));
    }

    let auth_config = AuthConfig::new(args.frontend_base_url)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_verification_token_ttl_seconds(args.verification_token_ttl_seconds)
        .with_home_path(args.home_path);

    let state = api::state::AuthState::new(
        auth_config,
        Arc::new(store),
        Arc::new(Argon2Scheme),
        providers,
        Arc::new(LogVerificationSender),
    );

    let result = api::new(args.port, Arc::new(state)).await;
    telemetry::shutdown_tracer();
    result
}
