pub mod auth_api;
pub mod billing_api;
pub mod configuration;
pub mod credentials;
pub mod fs;
pub mod network;
pub mod notifications;
pub mod paths;
pub mod telemetry;

// Re-exports for convenience
pub use auth_api::HttpAuthApi;
pub use billing_api::HttpBillingApi;
pub use credentials::{ConfiguredCredentialStore, FileCredentialStore, KeyringCredentialStore};
pub use notifications::FileNotificationStore;
