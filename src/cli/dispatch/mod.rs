//! Map validated CLI arguments to the action that runs them.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, oauth, ARG_DSN, ARG_PORT};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        apply_schema: auth_opts.apply_schema,
        frontend_base_url: auth_opts.frontend_base_url,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        verification_token_ttl_seconds: auth_opts.verification_token_ttl_seconds,
        home_path: auth_opts.home_path,
        google: oauth::GoogleOptions::parse(matches),
    }))
}
