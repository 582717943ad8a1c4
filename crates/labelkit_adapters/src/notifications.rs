use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use labelkit_core::entities::{Notification, NotificationKey};
use labelkit_core::ports::NotificationStore;
use labelkit_core::Error;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::fs::{read_optional, write_atomic};

const NOTIFICATIONS_FILE: &str = "notifications.json";
const SUPPRESSED_FILE: &str = "suppressed_notifications.json";

/// JSON files for the notification list and the dismissed keys
pub struct FileNotificationStore {
    notifications_path: PathBuf,
    suppressed_path: PathBuf,
}

impl FileNotificationStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        let data_dir = data_dir.as_ref();
        Self {
            notifications_path: data_dir.join(NOTIFICATIONS_FILE),
            suppressed_path: data_dir.join(SUPPRESSED_FILE),
        }
    }

    async fn load<T: DeserializeOwned + Default>(path: &Path) -> Result<T, Error> {
        let Some(content) = read_optional(path).await.map_err(|e| {
            Error::NotificationStorage(format!("failed to read {}: {}", path.display(), e))
        })?
        else {
            return Ok(T::default());
        };

        serde_json::from_str(&content).map_err(|e| {
            Error::NotificationStorage(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    async fn save<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), Error> {
        let content = serde_json::to_string_pretty(value)
            .map_err(|e| Error::NotificationStorage(format!("failed to serialize: {}", e)))?;

        write_atomic(path, content.as_bytes()).await.map_err(|e| {
            Error::NotificationStorage(format!("failed to write {}: {}", path.display(), e))
        })
    }
}

#[async_trait]
impl NotificationStore for FileNotificationStore {
    #[instrument(skip(self))]
    async fn load_notifications(&self) -> Result<Vec<Notification>, Error> {
        Self::load(&self.notifications_path).await
    }

    #[instrument(skip(self, notifications), fields(count = notifications.len()))]
    async fn save_notifications(&self, notifications: &[Notification]) -> Result<(), Error> {
        debug!("saving notifications");
        Self::save(&self.notifications_path, notifications).await
    }

    #[instrument(skip(self))]
    async fn load_suppressed(&self) -> Result<BTreeSet<NotificationKey>, Error> {
        Self::load(&self.suppressed_path).await
    }

    #[instrument(skip(self, keys), fields(count = keys.len()))]
    async fn save_suppressed(&self, keys: &BTreeSet<NotificationKey>) -> Result<(), Error> {
        Self::save(&self.suppressed_path, keys).await
    }
}
