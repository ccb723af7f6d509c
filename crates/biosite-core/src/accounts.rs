//! # Accounts
//!
//! Registration, login, logout and bearer-token resolution on top of the
//! [`Store`].
//!
//! A successful register or login issues a fresh token. The token itself
//! is returned exactly once; the store keeps only its digest together with
//! the owning user and an expiry `session_ttl` in the future.

use crate::auth::{PasswordHasher, generate_token, token_digest};
use crate::forms::{Form, LoginForm, RegisterForm};
use crate::storage::Store;
use crate::{BiositeError, SessionRecord, User, UserProfile};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Default lifetime of a login session.
pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// Longest accepted session lifetime (one year).
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 366;

/// Session lifetime for `hours`, or `None` outside `1..=MAX_SESSION_TTL_HOURS`.
pub fn session_ttl_from_hours(hours: i64) -> Option<TimeDelta> {
    if (1..=MAX_SESSION_TTL_HOURS).contains(&hours) {
        TimeDelta::try_hours(hours)
    } else {
        None
    }
}

/// A newly issued bearer token and the account it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedSession {
    pub token: String,
    pub user: UserProfile,
    pub expires_at: DateTime<Utc>,
}

/// Account operations with a fixed hashing cost and session lifetime.
#[derive(Debug, Clone, Copy)]
pub struct Authenticator {
    hasher: PasswordHasher,
    session_ttl: TimeDelta,
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new(
            PasswordHasher::default(),
            TimeDelta::hours(DEFAULT_SESSION_TTL_HOURS),
        )
    }
}

impl Authenticator {
    #[must_use]
    pub fn new(hasher: PasswordHasher, session_ttl: TimeDelta) -> Self {
        Self {
            hasher,
            session_ttl,
        }
    }

    /// Create an account without opening a session.
    pub fn create_user(&self, store: &Store, form: RegisterForm) -> Result<User, BiositeError> {
        let form = form.validate()?;
        let digest = self.hasher.hash(&form.password);
        store.create_user(&form.email, form.name, digest)
    }

    /// Create an account and log it in.
    pub fn register(
        &self,
        store: &Store,
        form: RegisterForm,
    ) -> Result<IssuedSession, BiositeError> {
        // fail before the account exists if no session could be issued
        self.expiry(Utc::now())?;
        let user = self.create_user(store, form)?;
        self.issue(store, &user)
    }

    /// Check credentials and open a session.
    ///
    /// Unknown email and wrong password fail identically, and both pay
    /// for one password hash.
    pub fn login(&self, store: &Store, form: LoginForm) -> Result<IssuedSession, BiositeError> {
        let form = form.validate()?;
        let Some(user) = store.find_user_by_email(&form.email)? else {
            self.hasher.verify_missing(&form.password);
            return Err(BiositeError::InvalidCredentials);
        };
        if !PasswordHasher::verify(&form.password, &user.password_hash) {
            return Err(BiositeError::InvalidCredentials);
        }
        self.issue(store, &user)
    }

    /// Revoke the session behind `token`.
    pub fn logout(&self, store: &Store, token: &str) -> Result<(), BiositeError> {
        if store.revoke_session(&token_digest(token))? {
            Ok(())
        } else {
            Err(BiositeError::Unauthenticated)
        }
    }

    /// Resolve a bearer token to its account.
    pub fn authenticate(&self, store: &Store, token: &str) -> Result<User, BiositeError> {
        store.resolve_session(&token_digest(token), Utc::now())
    }

    fn expiry(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, BiositeError> {
        now.checked_add_signed(self.session_ttl).ok_or_else(|| {
            BiositeError::SessionTtlOutOfRange(format!(
                "{}h from {now}",
                self.session_ttl.num_hours()
            ))
        })
    }

    fn issue(&self, store: &Store, user: &User) -> Result<IssuedSession, BiositeError> {
        let now = Utc::now();
        let expires_at = self.expiry(now)?;
        let token = generate_token();
        let session = SessionRecord {
            user_id: user.id,
            created_at: now,
            expires_at,
        };
        store.create_session(&token_digest(&token), &session)?;
        Ok(IssuedSession {
            token,
            user: UserProfile::from(user),
            expires_at: session.expires_at,
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (Store, Authenticator) {
        let store = Store::in_memory().expect("store");
        let auth = Authenticator::new(PasswordHasher::new(2), TimeDelta::hours(1));
        (store, auth)
    }

    fn register_form() -> RegisterForm {
        RegisterForm {
            email: "Ada@Example.com".into(),
            password: "analytical-engine".into(),
            name: Some("Ada".into()),
        }
    }

    #[test]
    fn register_then_authenticate() {
        let (store, auth) = setup();
        let issued = auth.register(&store, register_form()).expect("register");
        assert_eq!(issued.user.email, "ada@example.com");

        let user = auth.authenticate(&store, &issued.token).expect("authenticate");
        assert_eq!(user.id, issued.user.id);
        assert_ne!(user.password_hash, "analytical-engine");
    }

    #[test]
    fn duplicate_registration_conflicts() {
        let (store, auth) = setup();
        auth.register(&store, register_form()).expect("first");
        assert!(matches!(
            auth.register(&store, register_form()),
            Err(BiositeError::Conflict(_))
        ));
    }

    #[test]
    fn login_checks_password() {
        let (store, auth) = setup();
        auth.register(&store, register_form()).expect("register");

        let ok = auth
            .login(
                &store,
                LoginForm {
                    email: "ADA@example.com".into(),
                    password: "analytical-engine".into(),
                },
            )
            .expect("login");
        assert_eq!(ok.user.name.as_deref(), Some("Ada"));

        for (email, password) in [
            ("ada@example.com", "difference-engine"),
            ("nobody@example.com", "analytical-engine"),
        ] {
            let err = auth
                .login(
                    &store,
                    LoginForm {
                        email: email.into(),
                        password: password.into(),
                    },
                )
                .expect_err("bad credentials");
            assert_eq!(err, BiositeError::InvalidCredentials);
        }
    }

    #[test]
    fn logout_revokes_only_that_token() {
        let (store, auth) = setup();
        let first = auth.register(&store, register_form()).expect("register");
        let second = auth
            .login(
                &store,
                LoginForm {
                    email: "ada@example.com".into(),
                    password: "analytical-engine".into(),
                },
            )
            .expect("login");

        auth.logout(&store, &first.token).expect("logout");
        assert_eq!(
            auth.authenticate(&store, &first.token),
            Err(BiositeError::Unauthenticated)
        );
        assert!(auth.authenticate(&store, &second.token).is_ok());
        assert_eq!(
            auth.logout(&store, &first.token),
            Err(BiositeError::Unauthenticated)
        );
    }

    #[test]
    fn expired_sessions_do_not_authenticate() {
        let store = Store::in_memory().expect("store");
        let auth = Authenticator::new(PasswordHasher::new(1), TimeDelta::zero());
        let issued = auth.register(&store, register_form()).expect("register");
        assert_eq!(
            auth.authenticate(&store, &issued.token),
            Err(BiositeError::Unauthenticated)
        );
    }

    #[test]
    fn unrepresentable_expiry_fails_without_creating_the_account() {
        let store = Store::in_memory().expect("store");
        let ttl = TimeDelta::try_hours(10_000_000_000).expect("fits in a TimeDelta");
        let auth = Authenticator::new(PasswordHasher::new(1), ttl);
        let err = auth
            .register(&store, register_form())
            .expect_err("expiry overflows");
        assert!(matches!(err, BiositeError::SessionTtlOutOfRange(_)));
        assert_eq!(store.counts().expect("counts").users, 0);
        assert_eq!(store.counts().expect("counts").sessions, 0);
    }

    #[test]
    fn session_ttl_hours_are_bounded() {
        assert_eq!(session_ttl_from_hours(24), Some(TimeDelta::hours(24)));
        assert_eq!(session_ttl_from_hours(0), None);
        assert_eq!(session_ttl_from_hours(-5), None);
        assert_eq!(session_ttl_from_hours(MAX_SESSION_TTL_HOURS + 1), None);
        assert_eq!(session_ttl_from_hours(10_000_000_000), None);
    }

    #[test]
    fn weak_password_is_a_validation_error() {
        let (store, auth) = setup();
        let err = auth
            .register(
                &store,
                RegisterForm {
                    password: "short".into(),
                    ..register_form()
                },
            )
            .expect_err("weak password");
        assert!(matches!(err, BiositeError::Validation(_)));
    }
}
