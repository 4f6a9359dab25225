use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use clap::{Arg, ArgAction, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_VERIFICATION_TTL_SECONDS: &str = "verification-token-ttl-seconds";
pub const ARG_HOME_PATH: &str = "home-path";
pub const ARG_APPLY_SCHEMA: &str = "apply-schema";

#[derive(Debug)]
pub struct Options {
    pub frontend_base_url: String,
    pub session_ttl_seconds: i64,
    pub verification_token_ttl_seconds: i64,
    pub home_path: String,
    pub apply_schema: bool,
}

impl Options {
    /// # Errors
    /// Returns an error if a value is missing or out of range.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .context("missing required argument: --frontend-base-url")?;
        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .context("missing required argument: --session-ttl-seconds")?;
        let verification_token_ttl_seconds = matches
            .get_one::<i64>(ARG_VERIFICATION_TTL_SECONDS)
            .copied()
            .context("missing required argument: --verification-token-ttl-seconds")?;
        let home_path = matches
            .get_one::<String>(ARG_HOME_PATH)
            .cloned()
            .context("missing required argument: --home-path")?;

        check_ttl(ARG_SESSION_TTL_SECONDS, session_ttl_seconds)?;
        check_ttl(ARG_VERIFICATION_TTL_SECONDS, verification_token_ttl_seconds)?;
        if !home_path.starts_with('/') {
            bail!("--{ARG_HOME_PATH} must be an absolute path");
        }
        if home_path.trim_end_matches('/').is_empty() {
            bail!("--{ARG_HOME_PATH} cannot be the site root");
        }

        Ok(Self {
            frontend_base_url,
            session_ttl_seconds,
            verification_token_ttl_seconds,
            home_path,
            apply_schema: matches.get_flag(ARG_APPLY_SCHEMA),
        })
    }
}

/// A TTL must be positive and still land on a representable date.
fn check_ttl(arg: &str, seconds: i64) -> Result<()> {
    if seconds <= 0 {
        bail!("--{arg} must be positive");
    }
    let fits = Duration::try_seconds(seconds)
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .is_some();
    if !fits {
        bail!("--{arg} is too large: {seconds}");
    }
    Ok(())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for callbacks and verification links")
                .env("PORTCULLIS_FRONTEND_BASE_URL")
                .default_value("http://localhost:8080"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("PORTCULLIS_SESSION_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_VERIFICATION_TTL_SECONDS)
                .long(ARG_VERIFICATION_TTL_SECONDS)
                .help("Email verification token TTL in seconds")
                .env("PORTCULLIS_VERIFICATION_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_HOME_PATH)
                .long(ARG_HOME_PATH)
                .help("Where signed-in users are sent from public pages")
                .env("PORTCULLIS_HOME_PATH")
                .default_value("/dashboard"),
        )
        .arg(
            Arg::new(ARG_APPLY_SCHEMA)
                .long(ARG_APPLY_SCHEMA)
                .help("Create missing tables before serving")
                .env("PORTCULLIS_APPLY_SCHEMA")
                .action(ArgAction::SetTrue),
        )
}
