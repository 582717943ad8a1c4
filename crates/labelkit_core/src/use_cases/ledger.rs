use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::entities::{PurchaseReceipt, PurchaseRequest, TokenAccount};
use crate::error::Error;
use crate::ports::{AuthApi, BillingApi, CredentialStore};
use crate::use_cases::session::{RefreshOutcome, SessionManager};

/// Accepted purchase plus the ledger state fetched right after it
#[derive(Debug, Clone)]
pub struct PurchaseOutcome {
    pub receipt: PurchaseReceipt,
    /// Post-purchase server snapshot; `None` if the re-fetch failed
    pub account: Option<TokenAccount>,
}

/// Caches the server's token account for the current session.
///
/// The cached account is only ever replaced by a server response for the
/// session that is still current; it is never adjusted locally. An account
/// cached under an earlier session epoch is dropped before the next fetch.
///
/// Derived alerts are not re-evaluated here. Callers that want them go
/// through `ControlPlane`, which runs the notification rules after every
/// ledger change.
pub struct UsageLedger<C, A, B>
where
    C: CredentialStore,
    A: AuthApi,
    B: BillingApi,
{
    session: Arc<SessionManager<C, A>>,
    billing: Arc<B>,
    account: watch::Sender<Option<TokenAccount>>,
    /// Session epoch the cached account was fetched under
    account_epoch: AtomicU64,
}

impl<C, A, B> UsageLedger<C, A, B>
where
    C: CredentialStore,
    A: AuthApi,
    B: BillingApi,
{
    pub fn new(session: Arc<SessionManager<C, A>>, billing: Arc<B>) -> Self {
        let (account, _) = watch::channel(None);
        Self {
            session,
            billing,
            account,
            account_epoch: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> Option<TokenAccount> {
        self.account.borrow().clone()
    }

    pub fn balance(&self) -> Option<u64> {
        self.account.borrow().as_ref().map(|a| a.balance)
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<TokenAccount>> {
        self.account.subscribe()
    }

    pub fn clear(&self) {
        self.account.send_if_modified(|account| account.take().is_some());
    }

    /// Fetch the balance with the bearer token current at call time.
    ///
    /// Without a session the cache is cleared. A 401 on a token that has
    /// meanwhile been rotated is not an error: the fetch is repeated once with
    /// the new token. Responses that arrive after the session changed are
    /// dropped.
    #[instrument(skip(self))]
    pub async fn refresh_balance(&self) -> Result<Option<TokenAccount>, Error> {
        let mut retried = false;

        loop {
            let session = self.session.snapshot();
            if session.epoch != self.account_epoch.load(Ordering::SeqCst) {
                self.clear();
            }
            let Some(token) = session.bearer().map(str::to_owned) else {
                self.clear();
                return Ok(None);
            };

            match self.billing.balance(&token).await {
                Ok(account) => {
                    let current = self.session.snapshot();
                    if current.epoch != session.epoch || !current.is_authenticated() {
                        debug!("discarding balance fetched for a previous session");
                        return Ok(self.snapshot());
                    }

                    debug!(balance = account.balance, "balance updated");
                    self.account_epoch.store(session.epoch, Ordering::SeqCst);
                    self.account.send_replace(Some(account.clone()));
                    return Ok(Some(account));
                }
                Err(e) if e.is_rejected_credential() && !retried => {
                    retried = true;
                    match self.session.refresh_after_rejection(&token).await {
                        RefreshOutcome::Refreshed | RefreshOutcome::AlreadyRefreshed => {
                            debug!("retrying balance fetch with rotated token");
                        }
                        RefreshOutcome::SessionEnded => {
                            self.clear();
                            return Ok(None);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "balance fetch failed");
                    return Err(e);
                }
            }
        }
    }

    /// Submit a purchase, then re-fetch the balance from the server.
    ///
    /// Never retried and never applied optimistically: on failure the cached
    /// balance is left exactly as it was.
    #[instrument(skip(self, request), fields(amount_ugx = request.amount_ugx, provider = %request.provider))]
    pub async fn purchase_tokens(&self, request: &PurchaseRequest) -> Result<PurchaseOutcome, Error> {
        let token = self
            .session
            .snapshot()
            .bearer()
            .map(str::to_owned)
            .ok_or(Error::NotAuthenticated)?;

        request.validate()?;

        let receipt = match self.billing.purchase(&token, request).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(error = %e, "purchase rejected");
                if e.is_rejected_credential() {
                    self.session.refresh_after_rejection(&token).await;
                }
                return Err(e);
            }
        };

        info!(
            transaction_id = receipt.transaction_id.as_deref().unwrap_or("-"),
            "purchase accepted"
        );

        let account = match self.refresh_balance().await {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "could not fetch balance after purchase");
                None
            }
        };

        Ok(PurchaseOutcome { receipt, account })
    }
}
