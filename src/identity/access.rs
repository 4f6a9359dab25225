//! Per-navigation access decisions.
//!
//! Pure and stateless: the gate calls [`AccessPolicy::decide`] on every
//! request and acts on the returned [`Decision`].

pub const DEFAULT_CALLBACK_PREFIX: &str = "/auth";
pub const DEFAULT_PROTECTED_PREFIX: &str = "/dashboard";
pub const DEFAULT_HOME: &str = "/dashboard";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
    Redirect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccessPolicy {
    callback_prefix: String,
    protected_prefix: String,
    home: String,
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self {
            callback_prefix: DEFAULT_CALLBACK_PREFIX.to_string(),
            protected_prefix: DEFAULT_PROTECTED_PREFIX.to_string(),
            home: DEFAULT_HOME.to_string(),
        }
    }
}

impl AccessPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_home(mut self, home: String) -> Self {
        self.home = home;
        self
    }

    #[must_use]
    pub fn home(&self) -> &str {
        &self.home
    }

    /// A root home covers `/` alone, not the whole site.
    fn at_home(&self, path: &str) -> bool {
        if self.home.trim_end_matches('/').is_empty() {
            return path.split('?').next() == Some("/");
        }
        under(path, &self.home)
    }

    #[must_use]
    pub fn decide(&self, authenticated: bool, path: &str) -> Decision {
        if under(path, &self.callback_prefix) {
            return Decision::Allow;
        }
        if under(path, &self.protected_prefix) {
            return if authenticated {
                Decision::Allow
            } else {
                Decision::Deny
            };
        }
        if authenticated {
            // Home may sit outside the protected namespace; never bounce it to itself.
            if self.at_home(path) {
                return Decision::Allow;
            }
            Decision::Redirect(self.home.clone())
        } else {
            Decision::Allow
        }
    }
}

/// Decide with the default namespaces.
#[must_use]
pub fn authorize(authenticated: bool, path: &str) -> Decision {
    AccessPolicy::default().decide(authenticated, path)
}

/// Segment-aware prefix match: `/dashboard` covers `/dashboard` and
/// `/dashboard/x` but not `/dashboards`.
fn under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dashboard_requires_authentication() {
        assert_eq!(authorize(false, "/dashboard/x"), Decision::Deny);
        assert_eq!(authorize(true, "/dashboard/x"), Decision::Allow);
        assert_eq!(authorize(false, "/dashboard"), Decision::Deny);
    }

    #[test]
    fn signed_in_users_are_steered_home() {
        assert_eq!(
            authorize(true, "/"),
            Decision::Redirect("/dashboard".to_string())
        );
        assert_eq!(
            authorize(true, "/login"),
            Decision::Redirect("/dashboard".to_string())
        );
        assert_eq!(authorize(false, "/"), Decision::Allow);
    }

    #[test]
    fn callbacks_are_always_reachable() {
        for authenticated in [true, false] {
            assert_eq!(
                authorize(authenticated, "/auth/google/callback"),
                Decision::Allow
            );
        }
    }

    #[test]
    fn matching_respects_segment_boundaries() {
        assert_eq!(authorize(false, "/dashboards"), Decision::Allow);
        assert_eq!(
            authorize(true, "/authority"),
            Decision::Redirect("/dashboard".to_string())
        );
        assert_eq!(authorize(false, "/dashboard?tab=1"), Decision::Deny);
    }

    #[test]
    fn home_is_configurable() {
        let policy = AccessPolicy::new().with_home("/app".to_string());
        assert_eq!(policy.decide(true, "/"), Decision::Redirect("/app".to_string()));
        assert_eq!(policy.home(), "/app");
        assert_eq!(policy.decide(true, "/app"), Decision::Allow);
    }

    #[test]
    fn decisions_are_repeatable() {
        let policy = AccessPolicy::default();
        let first = policy.decide(true, "/");
        let second = policy.decide(true, "/");
        assert_eq!(first, second);
    }

    #[test]
    fn root_home_still_redirects_public_pages() {
        let policy = AccessPolicy::new().with_home("/".to_string());
        assert_eq!(policy.decide(true, "/"), Decision::Allow);
        assert_eq!(policy.decide(true, "/?tab=1"), Decision::Allow);
        assert_eq!(
            policy.decide(true, "/login"),
            Decision::Redirect("/".to_string())
        );
        assert_eq!(policy.decide(false, "/login"), Decision::Allow);
    }
}
