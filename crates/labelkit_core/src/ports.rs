use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::entities::{
    Credentials, LoginGrant, Notification, NotificationKey, PurchaseReceipt, PurchaseRequest,
    RefreshGrant, Registration, RegistrationReceipt, StoredSession, TokenAccount, User,
};
use crate::error::Error;

// ============================================================================
// Local persistence
// ============================================================================

/// Durable storage for the authenticated session
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve the cached session, if any
    async fn load_session(&self) -> Result<Option<StoredSession>, Error>;

    /// Persist access token, refresh token and user in a single write
    async fn store_session(&self, session: &StoredSession) -> Result<(), Error>;

    /// Delete the cached session
    async fn clear_session(&self) -> Result<(), Error>;
}

/// Durable storage for the notification list and the suppressed-key set
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn load_notifications(&self) -> Result<Vec<Notification>, Error>;

    async fn save_notifications(&self, notifications: &[Notification]) -> Result<(), Error>;

    async fn load_suppressed(&self) -> Result<BTreeSet<NotificationKey>, Error>;

    async fn save_suppressed(&self, keys: &BTreeSet<NotificationKey>) -> Result<(), Error>;
}

// ============================================================================
// Remote collaborators
// ============================================================================

/// Account authentication endpoints (`/api/auth/*`)
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn register(&self, registration: &Registration) -> Result<RegistrationReceipt, Error>;

    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, Error>;

    async fn logout(&self, access_token: &str) -> Result<(), Error>;

    /// Succeeds when the access token is still accepted
    async fn verify(&self, access_token: &str) -> Result<(), Error>;

    /// Exchange a refresh token for a new access token
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, Error>;

    async fn current_user(&self, access_token: &str) -> Result<User, Error>;
}

/// Token ledger endpoints (`/api/tokens/*`)
#[async_trait]
pub trait BillingApi: Send + Sync {
    async fn balance(&self, access_token: &str) -> Result<TokenAccount, Error>;

    async fn purchase(
        &self,
        access_token: &str,
        request: &PurchaseRequest,
    ) -> Result<PurchaseReceipt, Error>;
}
