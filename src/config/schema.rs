use serde::Deserialize;

use crate::sources::Location;

/// Top-level settings loaded from `config.toml`.
///
/// File format: TOML
/// Default path (Linux/XDG): `$XDG_CONFIG_HOME/tracksync/config.toml` or `~/.config/tracksync/config.toml`
///
/// Precedence (highest wins):
/// 1) Environment variables (prefix `TRACKSYNC__`, `__` as nested separator)
/// 2) Config file (if present)
/// 3) Struct defaults
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub scanner: ScannerSettings,
    pub libraries: LibrarySettings,
    pub logging: LoggingSettings,
    /// Locations to seed the source list with on startup.
    ///
    /// Example: `[[sources]] path = "/music"` / `[[sources]] path = "/music/demos", include = false`
    pub sources: Vec<Location>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScannerSettings {
    /// File extensions to treat as audio (case-insensitive, without dot).
    pub extensions: Vec<String>,
    /// Whether to follow symlinks during scanning.
    pub follow_links: bool,
    /// Whether to include hidden files/directories (dotfiles).
    pub include_hidden: bool,
    /// Whether to arm filesystem watchers on included roots.
    pub watch: bool,
    /// Quiet period after the last filesystem event before queued janitor
    /// tasks are processed (milliseconds).
    pub janitor_delay_ms: u64,
    /// Quiet period after the last source change before a reconciliation
    /// pass starts (milliseconds).
    pub scan_delay_ms: u64,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            extensions: ["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus", "wma"]
                .into_iter()
                .map(String::from)
                .collect(),
            follow_links: true,
            include_hidden: false,
            watch: true,
            janitor_delay_ms: 400,
            scan_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Directory holding `<name>.toml` library definitions.
    pub dir: Option<std::path::PathBuf>,
    /// Whether music libraries found in `dir` are added automatically.
    pub auto_discover: bool,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            dir: None,
            auto_discover: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is not set.
    pub filter: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}
