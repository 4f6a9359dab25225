use clap::{Arg, Command};
use secrecy::SecretString;

use crate::identity::oauth::google::DEFAULT_SCOPE;

pub const ARG_GOOGLE_CLIENT_ID: &str = "google-client-id";
pub const ARG_GOOGLE_CLIENT_SECRET: &str = "google-client-secret";
pub const ARG_GOOGLE_REDIRECT_URL: &str = "google-redirect-url";
pub const ARG_GOOGLE_SCOPE: &str = "google-scope";

#[derive(Debug)]
pub struct GoogleOptions {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_url: Option<String>,
    pub scope: String,
}

impl GoogleOptions {
    /// Google sign-in is enabled only when both client id and secret are set.
    #[must_use]
    pub fn parse(matches: &clap::ArgMatches) -> Option<Self> {
        let (Some(client_id), Some(client_secret)) = (
            matches.get_one::<String>(ARG_GOOGLE_CLIENT_ID),
            matches.get_one::<String>(ARG_GOOGLE_CLIENT_SECRET),
        ) else {
            return None;
        };

        Some(Self {
            client_id: client_id.clone(),
            client_secret: SecretString::from(client_secret.clone()),
            redirect_url: matches.get_one::<String>(ARG_GOOGLE_REDIRECT_URL).cloned(),
            scope: matches
                .get_one::<String>(ARG_GOOGLE_SCOPE)
                .cloned()
                .unwrap_or_else(|| DEFAULT_SCOPE.to_string()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_ID)
                .long(ARG_GOOGLE_CLIENT_ID)
                .help("Google OAuth client id")
                .env("PORTCULLIS_GOOGLE_CLIENT_ID")
                .requires(ARG_GOOGLE_CLIENT_SECRET),
        )
        .arg(
            Arg::new(ARG_GOOGLE_CLIENT_SECRET)
                .long(ARG_GOOGLE_CLIENT_SECRET)
                .help("Google OAuth client secret")
                .env("PORTCULLIS_GOOGLE_CLIENT_SECRET")
                .hide_env_values(true)
                .requires(ARG_GOOGLE_CLIENT_ID),
        )
        .arg(
            Arg::new(ARG_GOOGLE_REDIRECT_URL)
                .long(ARG_GOOGLE_REDIRECT_URL)
                .help("OAuth callback URL (default: <frontend-base-url>/auth/google/callback)")
                .env("PORTCULLIS_GOOGLE_REDIRECT_URL"),
        )
        .arg(
            Arg::new(ARG_GOOGLE_SCOPE)
                .long(ARG_GOOGLE_SCOPE)
                .help("Space separated OAuth scopes")
                .env("PORTCULLIS_GOOGLE_SCOPE"),
        )
}
