use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::NotificationSettings;
use crate::entities::{Credentials, PurchaseRequest, Registration, SessionState, TokenAccount, User};
use crate::error::Error;
use crate::ports::{AuthApi, BillingApi, CredentialStore, NotificationStore};
use crate::use_cases::ledger::{PurchaseOutcome, UsageLedger};
use crate::use_cases::notifications::NotificationCenter;
use crate::use_cases::session::{
    RefreshOutcome, RegistrationOutcome, SessionManager, VerifyOutcome,
};

/// Wires the session, ledger and notification services together.
///
/// Each operation runs its follow-up work in a fixed order: session change,
/// then balance, then derived alerts.
pub struct ControlPlane<C, A, B, N>
where
    C: CredentialStore,
    A: AuthApi,
    B: BillingApi,
    N: NotificationStore,
{
    session: Arc<SessionManager<C, A>>,
    ledger: UsageLedger<C, A, B>,
    notifications: NotificationCenter<N>,
}

impl<C, A, B, N> ControlPlane<C, A, B, N>
where
    C: CredentialStore,
    A: AuthApi,
    B: BillingApi,
    N: NotificationStore,
{
    pub fn new(
        credential_store: Arc<C>,
        auth_api: Arc<A>,
        billing_api: Arc<B>,
        notification_store: Arc<N>,
        settings: NotificationSettings,
    ) -> Self {
        let session = Arc::new(SessionManager::new(credential_store, auth_api));
        Self {
            ledger: UsageLedger::new(session.clone(), billing_api),
            notifications: NotificationCenter::new(notification_store, settings),
            session,
        }
    }

    pub fn session(&self) -> &SessionManager<C, A> {
        &self.session
    }

    pub fn ledger(&self) -> &UsageLedger<C, A, B> {
        &self.ledger
    }

    pub fn notifications(&self) -> &NotificationCenter<N> {
        &self.notifications
    }

    /// Restore persisted state and bring it up to date with the server.
    #[instrument(skip(self))]
    pub async fn boot(&self) -> SessionState {
        self.notifications.load().await;

        if self.session.restore().await == SessionState::Authenticated {
            match self.session.verify_token().await {
                VerifyOutcome::SignedOut => info!("stored session is no longer valid"),
                VerifyOutcome::Unreachable => warn!("server unreachable, using cached session"),
                _ => {}
            }
        }

        self.sync_ledger().await;
        self.evaluate().await;
        self.session.snapshot().state
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<User, Error> {
        let user = self.session.login(credentials).await?;
        self.sync_ledger().await;
        self.evaluate().await;
        Ok(user)
    }

    pub async fn register(&self, registration: &Registration) -> Result<RegistrationOutcome, Error> {
        let outcome = self.session.register(registration).await?;
        self.sync_ledger().await;
        self.evaluate().await;
        Ok(outcome)
    }

    pub async fn logout(&self) {
        self.session.logout().await;
        self.ledger.clear();
        self.evaluate().await;
    }

    pub async fn verify_session(&self) -> VerifyOutcome {
        let outcome = self.session.verify_token().await;
        match outcome {
            VerifyOutcome::Refreshed => self.sync_ledger().await,
            VerifyOutcome::SignedOut | VerifyOutcome::NoSession => self.ledger.clear(),
            VerifyOutcome::Valid | VerifyOutcome::Unreachable => {}
        }
        self.evaluate().await;
        outcome
    }

    pub async fn refresh_session(&self) -> RefreshOutcome {
        let outcome = self.session.refresh_token().await;
        match outcome {
            RefreshOutcome::Refreshed => self.sync_ledger().await,
            RefreshOutcome::SessionEnded => self.ledger.clear(),
            RefreshOutcome::AlreadyRefreshed => {}
        }
        self.evaluate().await;
        outcome
    }

    pub async fn refresh_balance(&self) -> Result<Option<TokenAccount>, Error> {
        let account = self.ledger.refresh_balance().await?;
        self.evaluate().await;
        Ok(account)
    }

    /// A purchase rejected for its token is not resubmitted, but a session
    /// that survived the refresh gets its balance re-fetched.
    pub async fn purchase_tokens(&self, request: &PurchaseRequest) -> Result<PurchaseOutcome, Error> {
        let result = self.ledger.purchase_tokens(request).await;
        let rejected = matches!(&result, Err(e) if e.is_rejected_credential());

        if !self.session.is_authenticated() {
            self.ledger.clear();
        } else if rejected {
            self.sync_ledger().await;
        }

        if result.is_ok() || rejected {
            self.evaluate().await;
        }
        result
    }

    async fn sync_ledger(&self) {
        if let Err(e) = self.ledger.refresh_balance().await {
            warn!(error = %e, "balance unavailable");
        }
    }

    async fn evaluate(&self) {
        let session = self.session.snapshot();
        let account = self.ledger.snapshot();
        self.notifications.evaluate(&session, account.as_ref()).await;
    }
}
