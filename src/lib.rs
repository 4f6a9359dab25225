//! # Portcullis (identity and session gateway)
//!
//! `portcullis` authenticates users with an email and password or through a
//! third-party OAuth provider, issues opaque server-side sessions, and gates
//! every page navigation on session state.
//!
//! ## Authentication
//!
//! Login and registration are driven by [`identity::Authenticator`]. Every
//! call settles into one of a finite set of states (`success`, `failed`,
//! `invalid_data`, `user_exists`); faults never reach the caller as errors,
//! and the response never reveals whether an account exists.
//!
//! ## Sessions
//!
//! Session tokens are random, and only their SHA-256 hash is stored. Each
//! read re-derives the session claims: the user's canonical id always, plus
//! provider tokens when the session came from a federated sign-in.
//!
//! ## Access
//!
//! [`identity::access`] decides `allow`, `deny` or `redirect` for each
//! navigation. Provider callbacks are always reachable, the dashboard needs a
//! session, and signed-in users are steered away from public pages.

pub mod api;
pub mod cli;
pub mod identity;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
