use std::path::{Path, PathBuf};

use async_trait::async_trait;
use keyring::Entry;
use labelkit_core::config::{CredentialBackend, Settings};
use labelkit_core::entities::StoredSession;
use labelkit_core::ports::CredentialStore;
use labelkit_core::Error;
use tracing::{debug, instrument};

use crate::fs::{read_optional, remove_if_exists, write_private};
use crate::paths::data_dir;

const SERVICE_NAME: &str = "labelkit";
const SESSION_KEY: &str = "session";
const SESSION_FILE: &str = "session.json";

fn serialize(session: &StoredSession) -> Result<String, Error> {
    serde_json::to_string(session)
        .map_err(|e| Error::CredentialStorage(format!("failed to serialize session: {}", e)))
}

fn deserialize(json: &str) -> Result<StoredSession, Error> {
    serde_json::from_str(json)
        .map_err(|e| Error::CredentialStorage(format!("failed to deserialize session: {}", e)))
}

// ============================================================================
// Keyring
// ============================================================================

/// Keeps the whole session bundle in a single OS keyring entry
pub struct KeyringCredentialStore {
    key: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_key(SESSION_KEY)
    }

    /// Use a custom entry name, e.g. one per deployment
    pub fn with_key(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    fn get_entry(&self) -> Result<Entry, Error> {
        Entry::new(SERVICE_NAME, &self.key)
            .map_err(|e| Error::CredentialStorage(format!("failed to create keyring entry: {}", e)))
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    #[instrument(skip(self))]
    async fn load_session(&self) -> Result<Option<StoredSession>, Error> {
        let entry = self.get_entry()?;

        tokio::task::spawn_blocking(move || match entry.get_password() {
            Ok(json) => deserialize(&json).map(Some),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::CredentialStorage(format!(
                "failed to get session: {}",
                e
            ))),
        })
        .await
        .map_err(|e| Error::CredentialStorage(format!("task join error: {}", e)))?
    }

    #[instrument(skip(self, session), fields(user_id = session.user.id))]
    async fn store_session(&self, session: &StoredSession) -> Result<(), Error> {
        let entry = self.get_entry()?;
        let json = serialize(session)?;

        debug!(key = %self.key, "storing session in keyring");

        tokio::task::spawn_blocking(move || {
            entry
                .set_password(&json)
                .map_err(|e| Error::CredentialStorage(format!("failed to store session: {}", e)))
        })
        .await
        .map_err(|e| Error::CredentialStorage(format!("task join error: {}", e)))?
    }

    #[instrument(skip(self))]
    async fn clear_session(&self) -> Result<(), Error> {
        let entry = self.get_entry()?;

        tokio::task::spawn_blocking(move || match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::CredentialStorage(format!(
                "failed to delete session: {}",
                e
            ))),
        })
        .await
        .map_err(|e| Error::CredentialStorage(format!("task join error: {}", e)))?
    }
}

// ============================================================================
// File
// ============================================================================

/// Keeps the session bundle in `session.json` under the data directory
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(SESSION_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    #[instrument(skip(self))]
    async fn load_session(&self) -> Result<Option<StoredSession>, Error> {
        let content = read_optional(&self.path)
            .await
            .map_err(|e| Error::CredentialStorage(format!("failed to read session: {}", e)))?;

        content.as_deref().map(deserialize).transpose()
    }

    #[instrument(skip(self, session), fields(user_id = session.user.id))]
    async fn store_session(&self, session: &StoredSession) -> Result<(), Error> {
        let json = serialize(session)?;

        debug!(path = %self.path.display(), "storing session");

        write_private(&self.path, json.as_bytes())
            .await
            .map_err(|e| Error::CredentialStorage(format!("failed to store session: {}", e)))
    }

    #[instrument(skip(self))]
    async fn clear_session(&self) -> Result<(), Error> {
        remove_if_exists(&self.path)
            .await
            .map_err(|e| Error::CredentialStorage(format!("failed to delete session: {}", e)))
    }
}

// ============================================================================
// Backend selection
// ============================================================================

/// Credential store chosen by `storage.credential_backend`
pub enum ConfiguredCredentialStore {
    Keyring(KeyringCredentialStore),
    File(FileCredentialStore),
}

impl ConfiguredCredentialStore {
    pub fn from_settings(settings: &Settings) -> Self {
        match settings.storage.credential_backend {
            CredentialBackend::Keyring => Self::Keyring(KeyringCredentialStore::new()),
            CredentialBackend::File => Self::File(FileCredentialStore::new(data_dir(settings))),
        }
    }

    fn inner(&self) -> &dyn CredentialStore {
        match self {
            Self::Keyring(store) => store,
            Self::File(store) => store,
        }
    }
}

#[async_trait]
impl CredentialStore for ConfiguredCredentialStore {
    async fn load_session(&self) -> Result<Option<StoredSession>, Error> {
        self.inner().load_session().await
    }

    async fn store_session(&self, session: &StoredSession) -> Result<(), Error> {
        self.inner().store_session(session).await
    }

    async fn clear_session(&self) -> Result<(), Error> {
        self.inner().clear_session().await
    }
}
