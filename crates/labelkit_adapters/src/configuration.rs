use std::path::PathBuf;

use config::{Config, Environment, File};
use labelkit_core::config::Settings;

use crate::paths;

pub const ENV_PREFIX: &str = "LABELKIT";

pub fn get_configuration_with_paths(
    current_dir_path: Option<PathBuf>,
    system_config_dir_path: Option<PathBuf>,
) -> Result<Settings, config::ConfigError> {
    let config_directory = current_dir_path.unwrap_or_else(|| {
        std::env::current_dir()
            .map(|p| p.join("config"))
            .unwrap_or_else(|_| PathBuf::from("config"))
    });

    let system_config_dir = system_config_dir_path.unwrap_or_else(paths::config_dir);

    let settings = Config::builder()
        .set_default("api.base_url", "http://localhost:8000")?
        .set_default("api.api_key", "")?
        .set_default("api.timeout_secs", 30)?
        .set_default("api.connect_timeout_secs", 10)?
        // Storage (backend serializes to a lowercase string)
        .set_default("storage.credential_backend", "file")?
        // Derived alert thresholds
        .set_default("notifications.low_balance_threshold", 100)?
        .set_default("notifications.high_balance_threshold", 10_000)?
        .set_default("notifications.password_rotation_days", 90)?
        .set_default("notifications.welcome_window_hours", 24)?
        .set_default("log_level", "info")?
        .add_source(File::from(system_config_dir.join("config.toml")).required(false))
        .add_source(File::from(config_directory.join("config.toml")).required(false))
        .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()?;

    settings.try_deserialize::<Settings>()
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    get_configuration_with_paths(None, None)
}
