// Copyright 2024 Oxide Computer Company

//! The authentication and authorization requirements of one route

use super::identity::Roles;
use crate::handler::RouteMetadata;
use std::sync::Arc;
use std::sync::OnceLock;

/// What a route demands of its callers.
///
/// Requirements come from two places, combined so that either one can make a
/// route stricter:
///
/// * the route configuration ([`AuthConstraint::require_login()`],
///   [`AuthConstraint::require_role()`])
/// * the handler's own [`RouteMetadata`]
///
/// A role set in configuration wins over one declared by the handler.  By
/// default nothing is required, and an unauthenticated caller of a route that
/// does require login is redirected to the login page rather than sent a 401
/// challenge.
///
/// The combined answers are computed on first use and cached.  Constraints are
/// shared by every request for the route, so the cache is a `OnceLock`: two
/// requests racing on the first read both compute the same answer and only
/// one of them stores it.
#[derive(Clone, Debug)]
pub struct AuthConstraint {
    login: bool,
    role: Option<String>,
    redirect_to_login: bool,
    metadata: Arc<dyn RouteMetadata>,

    requires_login_memo: OnceLock<bool>,
    required_role_memo: OnceLock<Option<String>>,
}

impl AuthConstraint {
    pub fn new(metadata: Arc<dyn RouteMetadata>) -> Self {
        AuthConstraint {
            login: false,
            role: None,
            redirect_to_login: true,
            metadata,
            requires_login_memo: OnceLock::new(),
            required_role_memo: OnceLock::new(),
        }
    }

    pub fn require_login(&mut self) -> &mut Self {
        self.login = true;
        self.requires_login_memo = OnceLock::new();
        self
    }

    pub fn require_role(&mut self, role: &str) -> &mut Self {
        self.role = Some(role.to_string());
        self.required_role_memo = OnceLock::new();
        self
    }

    /// Answer unauthenticated requests with a 401 and the provider's
    /// challenges instead of a redirect to the login page.
    pub fn send_challenge_when_not_logged_in(&mut self) -> &mut Self {
        self.redirect_to_login = false;
        self
    }

    /// Redirect unauthenticated requests to the login page (the default).
    pub fn redirect_when_not_logged_in(&mut self) -> &mut Self {
        self.redirect_to_login = true;
        self
    }

    pub fn redirect_to_login(&self) -> bool {
        self.redirect_to_login
    }

    pub fn requires_login(&self) -> bool {
        *self
            .requires_login_memo
            .get_or_init(|| self.login || self.metadata.requires_login())
    }

    pub fn required_role(&self) -> Option<&str> {
        self.required_role_memo
            .get_or_init(|| {
                self.role.clone().or_else(|| self.metadata.required_role())
            })
            .as_deref()
    }

    pub fn roles_aware(&self) -> bool {
        self.metadata.roles_aware()
    }

    pub fn requires_roles(&self) -> bool {
        self.required_role().is_some() || self.roles_aware()
    }

    pub fn requires_auth(&self) -> bool {
        self.requires_login() || self.requires_roles()
    }

    /// Returns whether `roles` grant access to this route.
    ///
    /// No roles never satisfy a constraint.  A roles-aware handler accepts
    /// whatever roles the caller has and does its own checks.
    ///
    /// # Panics
    ///
    /// Panics if the handler is not roles-aware and no required role was
    /// configured or declared: such a route cannot be authorized.
    pub fn satisfied_by_roles(&self, roles: Option<&Roles>) -> bool {
        let roles = match roles {
            None => return false,
            Some(roles) => roles,
        };
        if self.roles_aware() {
            return true;
        }
        match self.required_role() {
            Some(role) => roles.contains(role),
            None => panic!("route requires a role but doesn't specify which"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::AuthConstraint;
    use crate::auth::Roles;
    use crate::handler::RouteMetadata;
    use crate::handler::StaticMetadata;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn constraint(metadata: StaticMetadata) -> AuthConstraint {
        AuthConstraint::new(Arc::new(metadata))
    }

    #[test]
    fn test_defaults() {
        let c = constraint(StaticMetadata::default());
        assert!(!c.requires_login());
        assert!(!c.requires_roles());
        assert!(!c.requires_auth());
        assert_eq!(c.required_role(), None);
        assert!(c.redirect_to_login());
    }

    #[test]
    fn test_login_from_either_source() {
        let mut c = constraint(StaticMetadata::default());
        c.require_login();
        assert!(c.requires_login());
        assert!(c.requires_auth());
        assert!(!c.requires_roles());

        let c = constraint(StaticMetadata::requiring_login());
        assert!(c.requires_login());
        assert!(c.requires_auth());
    }

    #[test]
    fn test_configured_role_wins() {
        let mut c = constraint(StaticMetadata::requiring_role("user"));
        assert_eq!(c.required_role(), Some("user"));
        c.require_role("admin");
        assert_eq!(c.required_role(), Some("admin"));
        assert!(c.requires_roles());
        assert!(c.requires_auth());
        assert!(!c.requires_login());
    }

    #[test]
    fn test_challenge_toggle() {
        let mut c = constraint(StaticMetadata::default());
        c.send_challenge_when_not_logged_in();
        assert!(!c.redirect_to_login());
        c.redirect_when_not_logged_in();
        assert!(c.redirect_to_login());
    }

    #[test]
    fn test_satisfied_by_roles() {
        let mut c = constraint(StaticMetadata::default());
        c.require_role("admin");
        assert!(!c.satisfied_by_roles(None));
        assert!(!c.satisfied_by_roles(Some(&Roles::none())));
        assert!(!c.satisfied_by_roles(Some(&Roles::of(["user"]))));
        assert!(c.satisfied_by_roles(Some(&Roles::of(["user", "admin"]))));
    }

    #[test]
    fn test_roles_aware_accepts_any_roles() {
        let c = constraint(StaticMetadata::checking_roles());
        assert!(c.requires_roles());
        assert!(c.requires_auth());
        assert_eq!(c.required_role(), None);
        assert!(c.satisfied_by_roles(Some(&Roles::none())));
        assert!(!c.satisfied_by_roles(None));
    }

    #[test]
    #[should_panic(
        expected = "route requires a role but doesn't specify which"
    )]
    fn test_unspecified_role_is_a_bug() {
        let c = constraint(StaticMetadata::default());
        c.satisfied_by_roles(Some(&Roles::of(["admin"])));
    }

    #[test]
    fn test_satisfied_by_none_never_panics() {
        let c = constraint(StaticMetadata::default());
        assert!(!c.satisfied_by_roles(None));
    }

    #[derive(Debug, Default)]
    struct CountingMetadata {
        login_calls: AtomicUsize,
        role_calls: AtomicUsize,
    }

    impl RouteMetadata for CountingMetadata {
        fn requires_login(&self) -> bool {
            self.login_calls.fetch_add(1, Ordering::SeqCst);
            true
        }

        fn required_role(&self) -> Option<String> {
            self.role_calls.fetch_add(1, Ordering::SeqCst);
            Some(String::from("ops"))
        }
    }

    #[test]
    fn test_metadata_resolved_once() {
        let metadata = Arc::new(CountingMetadata::default());
        let c = AuthConstraint::new(
            Arc::clone(&metadata) as Arc<dyn RouteMetadata>
        );
        for _ in 0..5 {
            assert!(c.requires_login());
            assert_eq!(c.required_role(), Some("ops"));
        }
        assert_eq!(metadata.login_calls.load(Ordering::SeqCst), 1);
        assert_eq!(metadata.role_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_across_threads() {
        let mut c = constraint(StaticMetadata::default());
        c.require_role("admin");
        let c = Arc::new(c);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&c);
                std::thread::spawn(move || {
                    c.satisfied_by_roles(Some(&Roles::of(["admin"])))
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}
