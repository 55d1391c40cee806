use std::{env, path::PathBuf};

use crate::error::{Result, SyncError};

use super::schema::Settings;

/// Configuration loading helpers.
///
/// `Settings::load` reads an optional config file, then environment variables
/// (prefix `TRACKSYNC__`), and falls back to struct defaults.
impl Settings {
    /// Load settings from an optional config file and the environment.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path();

        let mut builder = ::config::Config::builder();

        if let Some(path) = &config_path {
            builder = builder.add_source(::config::File::from(path.as_path()).required(false));
        }

        builder = builder.add_source(
            ::config::Environment::with_prefix("TRACKSYNC")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build()?;
        let settings: Settings = cfg.try_deserialize()?;
        Ok(settings)
    }

    /// Perform basic validation checks on loaded settings.
    pub fn validate(&self) -> Result<()> {
        if self.scanner.janitor_delay_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "scanner.janitor_delay_ms must be >= 1".to_string(),
            ));
        }
        if self.scanner.scan_delay_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "scanner.scan_delay_ms must be >= 1".to_string(),
            ));
        }
        if self.scanner.extensions.iter().all(|e| e.trim().is_empty()) {
            return Err(SyncError::InvalidConfig(
                "scanner.extensions must name at least one format".to_string(),
            ));
        }
        Ok(())
    }
}

/// Resolve the config path from `TRACKSYNC_CONFIG_PATH` or XDG defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Some(p) = env::var_os("TRACKSYNC_CONFIG_PATH") {
        let p = PathBuf::from(p);
        return Some(p);
    }
    default_config_path()
}

/// Compute the default config path under `$XDG_CONFIG_HOME/tracksync/config.toml`
/// or `~/.config/tracksync/config.toml` when `XDG_CONFIG_HOME` is not set.
pub fn default_config_path() -> Option<PathBuf> {
    let config_home = if let Some(xdg) = env::var_os("XDG_CONFIG_HOME") {
        Some(PathBuf::from(xdg))
    } else if let Some(home) = env::var_os("HOME") {
        Some(PathBuf::from(home).join(".config"))
    } else {
        None
    };

    config_home.map(|d| d.join("tracksync").join("config.toml"))
}
