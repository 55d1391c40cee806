//! Error type shared by the scanner, the janitor and the service layer.

use std::path::PathBuf;

/// Everything that can go wrong while keeping the collection in sync.
///
/// Background work (scan passes, watcher dispatch) never propagates these to
/// the caller; it logs them and degrades. Public operations that can fail
/// synchronously return them.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read metadata of {}: {message}", path.display())]
    Metadata { path: PathBuf, message: String },

    #[error("Could not expand library {name}: {message}")]
    Library { name: String, message: String },

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Could not spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("The files service has been shut down")]
    ShutDown,
}

impl SyncError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn library(name: impl Into<String>, message: impl ToString) -> Self {
        Self::Library {
            name: name.into(),
            message: message.to_string(),
        }
    }

    /// Whether a retry on a later pass may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io { .. })
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
