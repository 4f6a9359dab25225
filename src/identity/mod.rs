//! Identity core: credential checks, the auth orchestrator, session
//! enrichment and access decisions, behind store/hasher/provider seams.

pub mod access;
pub mod authenticator;
pub mod claims;
pub mod credentials;
pub mod linking;
pub mod model;
pub mod oauth;
pub mod outcome;
pub mod password;
pub mod session;
pub mod store;
#[cfg(test)]
pub(crate) mod testing;
pub mod verification;

pub use access::{authorize, AccessPolicy, Decision};
pub use authenticator::{AuthRequest, Authenticator};
pub use claims::{SessionClaims, SessionShell};
pub use credentials::{CredentialCheck, CredentialValidator, Credentials};
pub use outcome::{AuthError, AuthOutcome, AuthStatus};
pub use session::{IssuedSession, ResolvedSession, SessionIssuer};
pub use store::{IdentityStore, MemoryStore, PgIdentityStore, StoreError};
pub use verification::{LogVerificationSender, VerificationSender, Verifications, VerifyOutcome};
