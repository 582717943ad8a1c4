use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tracing::{debug, info, instrument, warn};

use crate::entities::{
    Credentials, Registration, SessionSnapshot, SessionState, SignOutReason, StoredSession, User,
};
use crate::error::Error;
use crate::ports::{AuthApi, CredentialStore};

/// Result of a token refresh attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// This call exchanged the refresh token
    Refreshed,
    /// Another caller rotated the token while this one waited
    AlreadyRefreshed,
    /// The session is gone; the user must log in again
    SessionEnded,
}

impl RefreshOutcome {
    pub fn is_authenticated(self) -> bool {
        !matches!(self, Self::SessionEnded)
    }
}

/// Result of verifying the cached access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    NoSession,
    Valid,
    /// Token was rejected and has been replaced
    Refreshed,
    /// Token was rejected and could not be replaced
    SignedOut,
    /// Server unreachable; the cached session is kept
    Unreachable,
}

/// Successful registration followed by the automatic login
#[derive(Debug, Clone)]
pub struct RegistrationOutcome {
    pub user: User,
    /// Informational only, the ledger fetch is authoritative
    pub welcome_tokens: u64,
}

/// State and epoch observed when a login or registration began
#[derive(Debug, Clone, Copy)]
struct AuthAttempt {
    previous: SessionState,
    epoch: u64,
}

/// Owns the authentication state machine and the credential store.
///
/// State is published through a watch channel; readers always see a complete
/// snapshot, never a half-applied transition.
pub struct SessionManager<C, A>
where
    C: CredentialStore,
    A: AuthApi,
{
    credential_store: Arc<C>,
    auth_api: Arc<A>,
    state: watch::Sender<SessionSnapshot>,
    refresh_gate: Mutex<()>,
}

impl<C, A> SessionManager<C, A>
where
    C: CredentialStore,
    A: AuthApi,
{
    pub fn new(credential_store: Arc<C>, auth_api: Arc<A>) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::loading());
        Self {
            credential_store,
            auth_api,
            state,
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn current_user(&self) -> Option<User> {
        self.state.borrow().user.clone()
    }

    /// Hydrate the session from the credential store at boot.
    ///
    /// A cached session resolves to `Authenticated` pending verification.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> SessionState {
        let stored = match self.credential_store.load_session().await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "discarding unreadable stored session");
                if let Err(e) = self.credential_store.clear_session().await {
                    warn!(error = %e, "failed to clear stored session");
                }
                None
            }
        };

        match stored {
            Some(stored) => {
                debug!(user_id = stored.user.id, "restored cached session");
                self.install(stored, None);
            }
            None => {
                self.state.send_modify(|s| s.state = SessionState::Unauthenticated);
            }
        }

        self.state.borrow().state
    }

    /// Authenticate with email-or-username and password.
    ///
    /// Tokens and user are persisted together or not at all; on failure the
    /// previous session is left untouched.
    #[instrument(skip(self, credentials), fields(identifier = %credentials.identifier))]
    pub async fn login(&self, credentials: &Credentials) -> Result<User, Error> {
        let attempt = self.begin_authenticating();
        self.sign_in(credentials, attempt).await
    }

    /// Create an account, then log in with the same credentials.
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    pub async fn register(&self, registration: &Registration) -> Result<RegistrationOutcome, Error> {
        let attempt = self.begin_authenticating();

        let receipt = match self.auth_api.register(registration).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "registration failed");
                self.abort_authenticating(attempt);
                return Err(e);
            }
        };

        info!(welcome_tokens = receipt.welcome_tokens, "account registered");

        let credentials = Credentials::new(registration.email.clone(), registration.password.clone());
        let user = self.sign_in(&credentials, attempt).await?;

        Ok(RegistrationOutcome {
            user,
            welcome_tokens: receipt.welcome_tokens,
        })
    }

    /// Best-effort remote logout, then unconditional local teardown.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let token = self.state.borrow().access_token.clone();

        if let Some(token) = token {
            if let Err(e) = self.auth_api.logout(&token).await {
                warn!(error = %e, "remote logout failed, clearing local session anyway");
            }
        }

        self.teardown(SignOutReason::UserRequested).await;
        info!("logged out");
    }

    /// Check the cached access token with the server, refreshing on rejection.
    #[instrument(skip(self))]
    pub async fn verify_token(&self) -> VerifyOutcome {
        let Some(token) = self.state.borrow().access_token.clone() else {
            return VerifyOutcome::NoSession;
        };

        match self.auth_api.verify(&token).await {
            Ok(()) => VerifyOutcome::Valid,
            Err(e) if e.is_rejected_credential() => {
                debug!("access token rejected, attempting refresh");
                if self.refresh_after_rejection(&token).await.is_authenticated() {
                    VerifyOutcome::Refreshed
                } else {
                    VerifyOutcome::SignedOut
                }
            }
            Err(e) => {
                warn!(error = %e, "could not verify access token");
                VerifyOutcome::Unreachable
            }
        }
    }

    /// Exchange the cached refresh token for a new access token.
    pub async fn refresh_token(&self) -> RefreshOutcome {
        let Some(token) = self.state.borrow().access_token.clone() else {
            return RefreshOutcome::SessionEnded;
        };
        self.refresh_after_rejection(&token).await
    }

    /// Refresh on behalf of a request that was rejected with `rejected_token`.
    ///
    /// Only one refresh runs at a time. Callers that queued behind it find the
    /// token already rotated and return without touching the refresh token
    /// again. Any failure of the exchange or of the profile re-fetch ends the
    /// session; there is no retry.
    #[instrument(skip_all)]
    pub async fn refresh_after_rejection(&self, rejected_token: &str) -> RefreshOutcome {
        let _gate = self.refresh_gate.lock().await;

        let current = self.snapshot();
        if current.access_token.as_deref() != Some(rejected_token) {
            return if current.is_authenticated() {
                debug!("token already rotated by a concurrent refresh");
                RefreshOutcome::AlreadyRefreshed
            } else {
                RefreshOutcome::SessionEnded
            };
        }

        let Some(refresh_token) = current.refresh_token else {
            info!("no refresh token cached, ending session");
            self.teardown(SignOutReason::SessionExpired).await;
            return RefreshOutcome::SessionEnded;
        };

        self.state.send_modify(|s| s.state = SessionState::Refreshing);
        let result = self.exchange(&refresh_token).await;

        if self.state.borrow().epoch != current.epoch {
            debug!("session changed during refresh, discarding result");
            return if self.is_authenticated() {
                RefreshOutcome::AlreadyRefreshed
            } else {
                RefreshOutcome::SessionEnded
            };
        }

        match result {
            Ok(stored) => {
                if let Err(e) = self.credential_store.store_session(&stored).await {
                    warn!(error = %e, "failed to persist refreshed session");
                }
                self.state.send_modify(|s| {
                    s.state = SessionState::Authenticated;
                    s.access_token = Some(stored.access_token);
                    s.refresh_token = Some(stored.refresh_token);
                    s.user = Some(stored.user);
                });
                info!("session refreshed");
                RefreshOutcome::Refreshed
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, signing out");
                self.teardown(SignOutReason::SessionExpired).await;
                RefreshOutcome::SessionEnded
            }
        }
    }

    // =========================================================================
    // Private helpers
    // =========================================================================

    fn begin_authenticating(&self) -> AuthAttempt {
        let mut attempt = AuthAttempt {
            previous: SessionState::Unauthenticated,
            epoch: 0,
        };
        self.state.send_modify(|s| {
            attempt = AuthAttempt {
                previous: s.state,
                epoch: s.epoch,
            };
            s.state = SessionState::Authenticating;
        });
        attempt
    }

    /// Leave `Authenticating` after a failed attempt.
    ///
    /// The state seen at the start is only put back if no other transition
    /// happened meanwhile; otherwise it follows the tokens actually held.
    fn abort_authenticating(&self, attempt: AuthAttempt) {
        self.state.send_if_modified(|s| {
            if s.state != SessionState::Authenticating {
                return false;
            }
            s.state = if s.epoch == attempt.epoch
                && attempt.previous != SessionState::Authenticating
            {
                attempt.previous
            } else if s.access_token.is_some() {
                SessionState::Authenticated
            } else {
                SessionState::Unauthenticated
            };
            true
        });
    }

    async fn sign_in(&self, credentials: &Credentials, attempt: AuthAttempt) -> Result<User, Error> {
        let stored = match self.authenticate(credentials).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "login failed");
                self.abort_authenticating(attempt);
                return Err(e);
            }
        };

        let user = stored.user.clone();
        self.install(stored, None);
        info!(user_id = user.id, "login successful");
        Ok(user)
    }

    async fn authenticate(&self, credentials: &Credentials) -> Result<StoredSession, Error> {
        let grant = self.auth_api.login(credentials).await?;
        let stored = StoredSession::from(grant);
        self.credential_store.store_session(&stored).await?;
        Ok(stored)
    }

    async fn exchange(&self, refresh_token: &str) -> Result<StoredSession, Error> {
        let grant = self.auth_api.refresh(refresh_token).await?;
        let user = self.auth_api.current_user(&grant.access_token).await?;

        Ok(StoredSession {
            access_token: grant.access_token,
            refresh_token: grant
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            user,
        })
    }

    fn install(&self, stored: StoredSession, signed_out: Option<SignOutReason>) {
        self.state.send_modify(|s| {
            s.state = SessionState::Authenticated;
            s.access_token = Some(stored.access_token);
            s.refresh_token = Some(stored.refresh_token);
            s.user = Some(stored.user);
            s.epoch += 1;
            s.signed_out = signed_out;
        });
    }

    async fn teardown(&self, reason: SignOutReason) {
        self.state.send_modify(|s| {
            s.state = SessionState::Unauthenticated;
            s.access_token = None;
            s.refresh_token = None;
            s.user = None;
            s.epoch += 1;
            s.signed_out = Some(reason);
        });

        if let Err(e) = self.credential_store.clear_session().await {
            warn!(error = %e, "failed to clear stored session");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::{
        sample_user, FakeAuthApi, InMemoryCredentialStore, PASSWORD,
    };
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn manager(
        store: &Arc<InMemoryCredentialStore>,
        api: &Arc<FakeAuthApi>,
    ) -> SessionManager<InMemoryCredentialStore, FakeAuthApi> {
        SessionManager::new(store.clone(), api.clone())
    }

    async fn logged_in() -> (
        Arc<InMemoryCredentialStore>,
        Arc<FakeAuthApi>,
        SessionManager<InMemoryCredentialStore, FakeAuthApi>,
    ) {
        let store = Arc::new(InMemoryCredentialStore::default());
        let api = Arc::new(FakeAuthApi::default());
        let session = manager(&store, &api);
        session.restore().await;
        session
            .login(&Credentials::new("alice", PASSWORD))
            .await
            .unwrap();
        (store, api, session)
    }

    #[tokio::test]
    async fn test_fresh_boot_is_unauthenticated() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let api = Arc::new(FakeAuthApi::default());
        let session = manager(&store, &api);

        assert!(session.snapshot().is_loading());
        assert_eq!(session.restore().await, SessionState::Unauthenticated);
        assert!(!session.is_authenticated());
        assert!(session.current_user().is_none());
    }

    #[tokio::test]
    async fn test_restore_hydrates_cached_session() {
        let store = Arc::new(InMemoryCredentialStore::with_session(StoredSession {
            access_token: "cached-access".to_string(),
            refresh_token: "cached-refresh".to_string(),
            user: sample_user(),
        }));
        let api = Arc::new(FakeAuthApi::default());
        let session = manager(&store, &api);

        assert_eq!(session.restore().await, SessionState::Authenticated);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.access_token.as_deref(), Some("cached-access"));
        assert_eq!(snapshot.user.unwrap().username, "alice");
    }

    #[tokio::test]
    async fn test_restore_discards_unreadable_session() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store.corrupt.store(true, Ordering::SeqCst);
        let api = Arc::new(FakeAuthApi::default());
        let session = manager(&store, &api);

        assert_eq!(session.restore().await, SessionState::Unauthenticated);
        assert!(store.clears.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_login_persists_all_three_parts() {
        let (store, _api, session) = logged_in().await;

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Authenticated);
        assert!(snapshot.is_authenticated());
        assert!(snapshot.refresh_token.is_some());

        let stored = store.current().unwrap();
        assert_eq!(Some(stored.access_token), snapshot.access_token);
        assert_eq!(Some(stored.refresh_token), snapshot.refresh_token);
        assert_eq!(Some(stored.user), snapshot.user);
    }

    #[tokio::test]
    async fn test_failed_login_leaves_state_untouched() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let api = Arc::new(FakeAuthApi::default());
        let session = manager(&store, &api);
        session.restore().await;

        let err = session
            .login(&Credentials::new("alice", "wrong"))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Incorrect email/username or password");
        assert_eq!(session.snapshot().state, SessionState::Unauthenticated);
        assert!(session.snapshot().access_token.is_none());
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_login_with_failing_store_persists_nothing() {
        let store = Arc::new(InMemoryCredentialStore::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        let api = Arc::new(FakeAuthApi::default());
        let session = manager(&store, &api);
        session.restore().await;

        let result = session.login(&Credentials::new("alice", PASSWORD)).await;

        assert!(matches!(result, Err(Error::CredentialStorage(_))));
        let snapshot = session.snapshot();
        assert!(snapshot.access_token.is_none());
        assert!(snapshot.refresh_token.is_none());
        assert!(snapshot.user.is_none());
    }

    #[tokio::test]
    async fn test_register_chains_into_login() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let api = Arc::new(FakeAuthApi::default());
        let session = manager(&store, &api);
        session.restore().await;

        let outcome = session
            .register(&Registration {
                email: "alice@example.com".to_string(),
                username: "alice".to_string(),
                password: PASSWORD.to_string(),
                full_name: Some("Alice Nakato".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(outcome.welcome_tokens, 50);
        assert!(session.is_authenticated());
        assert_eq!(api.calls(), vec!["register", "login:alice@example.com"]);
    }

    #[tokio::test]
    async fn test_register_failure_surfaces_server_message() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let api = Arc::new(FakeAuthApi::default());
        api.reject_registration.store(true, Ordering::SeqCst);
        let session = manager(&store, &api);
        session.restore().await;

        let err = session
            .register(&Registration {
                email: "alice@example.com".to_string(),
                username: "alice".to_string(),
                password: PASSWORD.to_string(),
                full_name: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Username already registered");
        assert_eq!(session.snapshot().state, SessionState::Unauthenticated);
        assert_eq!(api.calls(), vec!["register"]);
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_remote_fails() {
        let (store, api, session) = logged_in().await;
        api.fail_logout.store(true, Ordering::SeqCst);

        session.logout().await;

        let snapshot = session.snapshot();
        assert!(!snapshot.is_authenticated());
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert_eq!(snapshot.signed_out, Some(SignOutReason::UserRequested));
        assert!(store.current().is_none());
        assert!(api.calls().contains(&"logout".to_string()));
    }

    #[tokio::test]
    async fn test_verify_valid_token() {
        let (_store, _api, session) = logged_in().await;
        assert_eq!(session.verify_token().await, VerifyOutcome::Valid);
    }

    #[tokio::test]
    async fn test_verify_rejection_triggers_refresh() {
        let (store, api, session) = logged_in().await;
        api.verify_ok.store(false, Ordering::SeqCst);

        assert_eq!(session.verify_token().await, VerifyOutcome::Refreshed);
        let snapshot = session.snapshot();
        assert_eq!(snapshot.access_token.as_deref(), Some("access-2"));
        assert_eq!(snapshot.refresh_token.as_deref(), Some("refresh-2"));
        assert_eq!(store.current().unwrap().access_token, "access-2");
    }

    #[tokio::test]
    async fn test_verify_keeps_session_when_server_unreachable() {
        let (_store, api, session) = logged_in().await;
        api.verify_unreachable.store(true, Ordering::SeqCst);

        assert_eq!(session.verify_token().await, VerifyOutcome::Unreachable);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_verify_without_session() {
        let store = Arc::new(InMemoryCredentialStore::default());
        let api = Arc::new(FakeAuthApi::default());
        let session = manager(&store, &api);
        session.restore().await;

        assert_eq!(session.verify_token().await, VerifyOutcome::NoSession);
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_ends_session() {
        let (store, api, session) = logged_in().await;
        api.refresh_ok.store(false, Ordering::SeqCst);

        assert_eq!(session.refresh_token().await, RefreshOutcome::SessionEnded);
        let snapshot = session.snapshot();
        assert!(!snapshot.is_authenticated());
        assert_eq!(snapshot.signed_out, Some(SignOutReason::SessionExpired));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_refresh_with_failed_profile_fetch_ends_session() {
        let (store, api, session) = logged_in().await;
        api.me_ok.store(false, Ordering::SeqCst);

        assert_eq!(session.refresh_token().await, RefreshOutcome::SessionEnded);

        let snapshot = session.snapshot();
        assert!(snapshot.access_token.is_none());
        assert!(snapshot.refresh_token.is_none());
        assert!(snapshot.user.is_none());
        assert!(store.current().is_none());
        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_refresh_exchanges_once() {
        let (_store, api, session) = logged_in().await;
        *api.refresh_delay.lock().unwrap() = Some(Duration::from_millis(20));

        let (first, second) = tokio::join!(
            session.refresh_after_rejection("access-1"),
            session.refresh_after_rejection("access-1"),
        );

        assert_eq!(api.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(first, RefreshOutcome::Refreshed);
        assert_eq!(second, RefreshOutcome::AlreadyRefreshed);
        assert!(session.is_authenticated());
    }

    #[tokio::test]
    async fn test_refresh_completing_after_logout_is_discarded() {
        let (store, api, session) = logged_in().await;
        *api.refresh_delay.lock().unwrap() = Some(Duration::from_millis(20));

        let (outcome, ()) = tokio::join!(session.refresh_token(), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            session.logout().await;
        });

        assert_eq!(outcome, RefreshOutcome::SessionEnded);
        assert!(!session.is_authenticated());
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_login_racing_logout_ends_unauthenticated() {
        let (store, api, session) = logged_in().await;
        *api.login_delay.lock().unwrap() = Some(Duration::from_millis(20));

        let creds = Credentials::new("bob", "wrong");
        let (result, ()) = tokio::join!(session.login(&creds), async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            session.logout().await;
        });

        assert!(result.is_err());
        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Unauthenticated);
        assert!(!snapshot.is_authenticated());
        assert!(snapshot.access_token.is_none());
        assert_eq!(snapshot.signed_out, Some(SignOutReason::UserRequested));
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_failed_login_restores_existing_session_state() {
        let (_store, _api, session) = logged_in().await;

        session
            .login(&Credentials::new("alice", "wrong"))
            .await
            .unwrap_err();

        let snapshot = session.snapshot();
        assert_eq!(snapshot.state, SessionState::Authenticated);
        assert_eq!(snapshot.access_token.as_deref(), Some("access-1"));
    }

    #[tokio::test]
    async fn test_epoch_changes_on_identity_change() {
        let (_store, _api, session) = logged_in().await;
        let logged_in_epoch = session.snapshot().epoch;

        session.refresh_token().await;
        assert_eq!(session.snapshot().epoch, logged_in_epoch);

        session.logout().await;
        assert!(session.snapshot().epoch > logged_in_epoch);
    }

    #[tokio::test]
    async fn test_subscribers_observe_transitions() {
        let (_store, _api, session) = logged_in().await;
        let mut rx = session.subscribe();
        assert!(rx.borrow_and_update().is_authenticated());

        session.logout().await;

        assert!(rx.has_changed().unwrap());
        assert!(!rx.borrow_and_update().is_authenticated());
    }
}
