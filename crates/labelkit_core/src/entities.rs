use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Error;
use crate::serde_utils;

// ============================================================================
// Accounts & Sessions
// ============================================================================

/// Account profile as returned by `/api/auth/me` and the login endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub is_super_admin: bool,
    #[serde(deserialize_with = "serde_utils::timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "serde_utils::optional_timestamp::deserialize")]
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.full_name.as_deref().unwrap_or(&self.username)
    }
}

/// Login credentials (never persisted)
#[derive(Clone)]
pub struct Credentials {
    /// Email address or username
    pub identifier: String,
    pub password: String,
}

impl Credentials {
    pub fn new(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// New account request
#[derive(Clone)]
pub struct Registration {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: Option<String>,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("full_name", &self.full_name)
            .finish_non_exhaustive()
    }
}

/// Server response to a successful registration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistrationReceipt {
    #[serde(default)]
    pub welcome_tokens: u64,
    #[serde(default)]
    pub message: Option<String>,
}

/// Server response to a successful login
#[derive(Debug, Clone, Deserialize)]
pub struct LoginGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

/// Server response to a token refresh
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshGrant {
    pub access_token: String,
    /// Present when the server rotates refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// Everything the credential store persists, written as one unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub user: User,
}

impl From<LoginGrant> for StoredSession {
    fn from(grant: LoginGrant) -> Self {
        Self {
            access_token: grant.access_token,
            refresh_token: grant.refresh_token,
            user: grant.user,
        }
    }
}

/// Session state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading the credential store at boot
    Loading,
    Unauthenticated,
    /// Login or registration in flight
    Authenticating,
    Authenticated,
    /// Refresh token exchange in flight
    Refreshing,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loading => write!(f, "loading"),
            Self::Unauthenticated => write!(f, "unauthenticated"),
            Self::Authenticating => write!(f, "authenticating"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Refreshing => write!(f, "refreshing"),
        }
    }
}

/// Why the last session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignOutReason {
    UserRequested,
    /// Token verification or refresh failed; the user must log in again
    SessionExpired,
}

/// Published view of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<User>,
    /// Changes on every identity change (login, logout, teardown)
    pub epoch: u64,
    pub signed_out: Option<SignOutReason>,
}

impl SessionSnapshot {
    pub fn loading() -> Self {
        Self {
            state: SessionState::Loading,
            access_token: None,
            refresh_token: None,
            user: None,
            epoch: 0,
            signed_out: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }

    pub fn is_loading(&self) -> bool {
        self.state == SessionState::Loading
    }

    /// Bearer credential, only while authenticated
    pub fn bearer(&self) -> Option<&str> {
        if self.is_authenticated() {
            self.access_token.as_deref()
        } else {
            None
        }
    }
}

// ============================================================================
// Token ledger
// ============================================================================

/// Server-computed ledger snapshot. Replaced wholesale on every fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAccount {
    pub balance: u64,
    pub total_purchased: u64,
    pub total_used: u64,
    pub user_id: i64,
    #[serde(deserialize_with = "serde_utils::timestamp::deserialize")]
    pub created_at: DateTime<Utc>,
    #[serde(deserialize_with = "serde_utils::timestamp::deserialize")]
    pub updated_at: DateTime<Utc>,
}

/// Mobile money operators accepted by the billing API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Mtn,
    Airtel,
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mtn => write!(f, "mtn"),
            Self::Airtel => write!(f, "airtel"),
        }
    }
}

impl FromStr for PaymentProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mtn" => Ok(Self::Mtn),
            "airtel" => Ok(Self::Airtel),
            other => Err(Error::Validation(format!(
                "unsupported payment provider: {}",
                other
            ))),
        }
    }
}

/// Token purchase. `amount_ugx` is money, not credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurchaseRequest {
    pub amount_ugx: u64,
    pub provider: PaymentProvider,
    pub phone: String,
}

impl PurchaseRequest {
    pub fn new(amount_ugx: u64, provider: PaymentProvider, phone: &str) -> Self {
        Self {
            amount_ugx,
            provider,
            phone: phone.chars().filter(|c| !c.is_whitespace()).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.amount_ugx == 0 {
            return Err(Error::Validation(
                "Amount must be greater than zero".to_string(),
            ));
        }

        let digits = self.phone.strip_prefix('+').unwrap_or(&self.phone);
        let valid_phone = (9..=15).contains(&digits.len())
            && digits.chars().all(|c| c.is_ascii_digit());
        if !valid_phone {
            return Err(Error::Validation(format!(
                "Invalid phone number: {}",
                self.phone
            )));
        }

        Ok(())
    }
}

/// Server response to an accepted purchase
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PurchaseReceipt {
    #[serde(default)]
    pub transaction_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub tokens_added: Option<u64>,
}

// ============================================================================
// Notifications
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Success => write!(f, "success"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    System,
    Token,
    Security,
    General,
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Token => write!(f, "token"),
            Self::Security => write!(f, "security"),
            Self::General => write!(f, "general"),
        }
    }
}

/// Deduplication identity of a notification class
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NotificationKey {
    pub title: String,
    pub category: NotificationCategory,
}

impl NotificationKey {
    pub fn new(title: impl Into<String>, category: NotificationCategory) -> Self {
        Self {
            title: title.into(),
            category,
        }
    }
}

impl fmt::Display for NotificationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.title, self.category)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub read: bool,
    pub category: NotificationCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_url: Option<String>,
}

impl Notification {
    pub fn key(&self) -> NotificationKey {
        NotificationKey::new(self.title.clone(), self.category)
    }
}

/// Notification content before it gets an identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationDraft {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub action_url: Option<String>,
}

impl NotificationDraft {
    pub fn new(
        kind: NotificationKind,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            category,
            action_url: None,
        }
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey::new(self.title.clone(), self.category)
    }

    pub fn into_notification(self, timestamp: DateTime<Utc>) -> Notification {
        Notification {
            id: Uuid::new_v4(),
            kind: self.kind,
            title: self.title,
            message: self.message,
            timestamp,
            read: false,
            category: self.category,
            action_url: self.action_url,
        }
    }
}
