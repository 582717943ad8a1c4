//! In-memory implementations of the ports for use-case tests.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};

use crate::entities::{
    Credentials, LoginGrant, Notification, NotificationKey, PurchaseReceipt, PurchaseRequest,
    RefreshGrant, Registration, RegistrationReceipt, StoredSession, TokenAccount, User,
};
use crate::error::Error;
use crate::ports::{AuthApi, BillingApi, CredentialStore, NotificationStore};

pub const PASSWORD: &str = "pw";

pub fn sample_user() -> User {
    User {
        id: 7,
        email: "alice@example.com".to_string(),
        username: "alice".to_string(),
        full_name: None,
        is_admin: false,
        is_super_admin: false,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        last_login: Some(Utc::now()),
    }
}

pub fn account_with_balance(balance: u64) -> TokenAccount {
    TokenAccount {
        balance,
        total_purchased: balance + 25,
        total_used: 25,
        user_id: 7,
        created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
        updated_at: Utc::now(),
    }
}

// ============================================================================
// Credential store
// ============================================================================

#[derive(Default)]
pub struct InMemoryCredentialStore {
    session: Mutex<Option<StoredSession>>,
    pub fail_writes: AtomicBool,
    pub corrupt: AtomicBool,
    pub clears: AtomicUsize,
}

impl InMemoryCredentialStore {
    pub fn with_session(session: StoredSession) -> Self {
        let store = Self::default();
        *store.session.lock().unwrap() = Some(session);
        store
    }

    pub fn current(&self) -> Option<StoredSession> {
        self.session.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn load_session(&self) -> Result<Option<StoredSession>, Error> {
        if self.corrupt.load(Ordering::SeqCst) {
            return Err(Error::CredentialStorage(
                "failed to deserialize session".to_string(),
            ));
        }
        Ok(self.current())
    }

    async fn store_session(&self, session: &StoredSession) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::CredentialStorage("store is read-only".to_string()));
        }
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), Error> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        self.corrupt.store(false, Ordering::SeqCst);
        *self.session.lock().unwrap() = None;
        Ok(())
    }
}

// ============================================================================
// Notification store
// ============================================================================

#[derive(Default)]
pub struct InMemoryNotificationStore {
    pub notifications: Mutex<Vec<Notification>>,
    pub suppressed: Mutex<BTreeSet<NotificationKey>>,
    pub fail_writes: AtomicBool,
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn load_notifications(&self) -> Result<Vec<Notification>, Error> {
        Ok(self.notifications.lock().unwrap().clone())
    }

    async fn save_notifications(&self, notifications: &[Notification]) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::NotificationStorage("disk full".to_string()));
        }
        *self.notifications.lock().unwrap() = notifications.to_vec();
        Ok(())
    }

    async fn load_suppressed(&self) -> Result<BTreeSet<NotificationKey>, Error> {
        Ok(self.suppressed.lock().unwrap().clone())
    }

    async fn save_suppressed(&self, keys: &BTreeSet<NotificationKey>) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::NotificationStorage("disk full".to_string()));
        }
        *self.suppressed.lock().unwrap() = keys.clone();
        Ok(())
    }
}

// ============================================================================
// Auth API
// ============================================================================

/// Accepts `PASSWORD` for any identifier and issues numbered tokens
/// (`access-1`, `refresh-1`, then `access-2` on the first refresh, ...).
pub struct FakeAuthApi {
    pub user: Mutex<User>,
    pub verify_ok: AtomicBool,
    pub verify_unreachable: AtomicBool,
    pub refresh_ok: AtomicBool,
    pub me_ok: AtomicBool,
    pub fail_logout: AtomicBool,
    pub reject_registration: AtomicBool,
    pub login_delay: Mutex<Option<Duration>>,
    pub refresh_delay: Mutex<Option<Duration>>,
    pub refresh_calls: AtomicUsize,
    issued: AtomicU64,
    calls: Mutex<Vec<String>>,
}

impl Default for FakeAuthApi {
    fn default() -> Self {
        Self {
            user: Mutex::new(sample_user()),
            verify_ok: AtomicBool::new(true),
            verify_unreachable: AtomicBool::new(false),
            refresh_ok: AtomicBool::new(true),
            me_ok: AtomicBool::new(true),
            fail_logout: AtomicBool::new(false),
            reject_registration: AtomicBool::new(false),
            login_delay: Mutex::new(None),
            refresh_delay: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
            issued: AtomicU64::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl FakeAuthApi {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn next_serial(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }
}

#[async_trait]
impl AuthApi for FakeAuthApi {
    async fn register(&self, _registration: &Registration) -> Result<RegistrationReceipt, Error> {
        self.record("register");
        if self.reject_registration.load(Ordering::SeqCst) {
            return Err(Error::Validation("Username already registered".to_string()));
        }
        Ok(RegistrationReceipt {
            welcome_tokens: 50,
            message: None,
        })
    }

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, Error> {
        self.record(format!("login:{}", credentials.identifier));

        let delay = *self.login_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if credentials.password != PASSWORD {
            return Err(Error::Authentication(
                "Incorrect email/username or password".to_string(),
            ));
        }
        let serial = self.next_serial();
        Ok(LoginGrant {
            access_token: format!("access-{}", serial),
            refresh_token: format!("refresh-{}", serial),
            user: self.user.lock().unwrap().clone(),
        })
    }

    async fn logout(&self, _access_token: &str) -> Result<(), Error> {
        self.record("logout");
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(Error::Network("request timed out".to_string()));
        }
        Ok(())
    }

    async fn verify(&self, _access_token: &str) -> Result<(), Error> {
        self.record("verify");
        if self.verify_unreachable.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        if self.verify_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Authentication("Token has expired".to_string()))
        }
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<RefreshGrant, Error> {
        self.record("refresh");
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);

        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.refresh_ok.load(Ordering::SeqCst) {
            return Err(Error::Authentication("Invalid refresh token".to_string()));
        }
        let serial = self.next_serial();
        Ok(RefreshGrant {
            access_token: format!("access-{}", serial),
            refresh_token: Some(format!("refresh-{}", serial)),
        })
    }

    async fn current_user(&self, _access_token: &str) -> Result<User, Error> {
        self.record("me");
        if self.me_ok.load(Ordering::SeqCst) {
            Ok(self.user.lock().unwrap().clone())
        } else {
            Err(Error::Authentication(
                "Could not validate credentials".to_string(),
            ))
        }
    }
}

// ============================================================================
// Billing API
// ============================================================================

/// One credit per 100 UGX. Tokens listed in `rejected_tokens` get a 401.
pub struct FakeBillingApi {
    pub balance: Mutex<u64>,
    pub rejected_tokens: Mutex<HashSet<String>>,
    pub purchase_error: Mutex<Option<String>>,
    pub balance_unavailable: AtomicBool,
    pub balance_delay: Mutex<Option<Duration>>,
    balance_calls: Mutex<Vec<String>>,
    purchase_calls: AtomicUsize,
}

impl FakeBillingApi {
    pub fn with_balance(balance: u64) -> Self {
        Self {
            balance: Mutex::new(balance),
            rejected_tokens: Mutex::new(HashSet::new()),
            purchase_error: Mutex::new(None),
            balance_unavailable: AtomicBool::new(false),
            balance_delay: Mutex::new(None),
            balance_calls: Mutex::new(Vec::new()),
            purchase_calls: AtomicUsize::new(0),
        }
    }

    pub fn reject(&self, token: &str) {
        self.rejected_tokens.lock().unwrap().insert(token.to_string());
    }

    pub fn set_balance(&self, balance: u64) {
        *self.balance.lock().unwrap() = balance;
    }

    /// Bearer tokens used for balance fetches, in order
    pub fn balance_calls(&self) -> Vec<String> {
        self.balance_calls.lock().unwrap().clone()
    }

    pub fn purchase_calls(&self) -> usize {
        self.purchase_calls.load(Ordering::SeqCst)
    }

    fn check_token(&self, access_token: &str) -> Result<(), Error> {
        if self.rejected_tokens.lock().unwrap().contains(access_token) {
            return Err(Error::Authentication("Token has expired".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingApi for FakeBillingApi {
    async fn balance(&self, access_token: &str) -> Result<TokenAccount, Error> {
        self.balance_calls
            .lock()
            .unwrap()
            .push(access_token.to_string());

        let delay = *self.balance_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.check_token(access_token)?;
        if self.balance_unavailable.load(Ordering::SeqCst) {
            return Err(Error::Network("service unavailable".to_string()));
        }
        Ok(account_with_balance(*self.balance.lock().unwrap()))
    }

    async fn purchase(
        &self,
        access_token: &str,
        request: &PurchaseRequest,
    ) -> Result<PurchaseReceipt, Error> {
        self.purchase_calls.fetch_add(1, Ordering::SeqCst);
        self.check_token(access_token)?;

        if let Some(message) = self.purchase_error.lock().unwrap().clone() {
            return Err(Error::Authorization(message));
        }

        let credits = request.amount_ugx / 100;
        *self.balance.lock().unwrap() += credits;
        Ok(PurchaseReceipt {
            transaction_id: Some("txn-1".to_string()),
            status: Some("completed".to_string()),
            message: None,
            tokens_added: Some(credits),
        })
    }
}
