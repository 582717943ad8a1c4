//! Platform directories for configuration and data.

use std::path::PathBuf;

use directories::ProjectDirs;
use labelkit_core::config::Settings;

pub fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "labelkit", "labelkit")
}

pub fn config_dir() -> PathBuf {
    project_dirs()
        .map(|d| d.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("config"))
}

/// Where the session and notification files live: `storage.data_dir` when set,
/// otherwise the platform data directory.
pub fn data_dir(settings: &Settings) -> PathBuf {
    settings.storage.data_dir.clone().unwrap_or_else(|| {
        project_dirs()
            .map(|d| d.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("data"))
    })
}
