//! Configuration loading from `~/.openpeer/config.toml` with defaults.

use openpeer_types::ChannelConfig;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default location of the config file.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".openpeer")
        .join("config.toml")
}

/// Load channel configuration from a TOML file, with defaults.
///
/// A missing file yields the defaults silently; an unreadable or invalid file
/// yields the defaults with a warning.
pub fn load_config(path: Option<&Path>) -> ChannelConfig {
    let config_path = path
        .map(|p| p.to_path_buf())
        .unwrap_or_else(default_config_path);

    if !config_path.exists() {
        info!(path = %config_path.display(), "Config file not found, using defaults");
        return ChannelConfig::default();
    }

    match std::fs::read_to_string(&config_path) {
        Ok(contents) => match ChannelConfig::from_toml_str(&contents) {
            Ok(config) => {
                info!(path = %config_path.display(), id = %config.id, "Loaded configuration");
                config
            }
            Err(e) => {
                warn!(
                    error = %e,
                    path = %config_path.display(),
                    "Failed to parse config, using defaults"
                );
                ChannelConfig::default()
            }
        },
        Err(e) => {
            warn!(
                error = %e,
                path = %config_path.display(),
                "Failed to read config file, using defaults"
            );
            ChannelConfig::default()
        }
    }
}
