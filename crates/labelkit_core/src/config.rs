use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// OS keyring (libsecret, Keychain, Credential Manager)
    Keyring,
    /// JSON file in the data directory
    #[default]
    File,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub storage: StorageSettings,
    pub notifications: NotificationSettings,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ApiSettings {
    pub base_url: String,
    /// Deployment-level key sent as `X-API-Key` on every request
    pub api_key: String,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct StorageSettings {
    pub data_dir: Option<PathBuf>,
    pub credential_backend: CredentialBackend,
}

/// Thresholds for derived alerts
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub struct NotificationSettings {
    /// Balances strictly between zero and this value warn
    pub low_balance_threshold: u64,
    /// Balances at or above this value celebrate
    pub high_balance_threshold: u64,
    pub password_rotation_days: i64,
    pub welcome_window_hours: i64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api: ApiSettings::default(),
            storage: StorageSettings::default(),
            notifications: NotificationSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            api_key: String::new(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            low_balance_threshold: 100,
            high_balance_threshold: 10_000,
            password_rotation_days: 90,
            welcome_window_hours: 24,
        }
    }
}
