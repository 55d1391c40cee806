use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{Result, SyncError};

/// What a library holds. Only music libraries are discovered automatically.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryKind {
    Music,
    #[default]
    #[serde(other)]
    Other,
}

/// A named set of folders, read from `<dir>/<name>.toml`.
///
/// ```toml
/// kind = "music"
/// folders = ["/home/me/Music", "/mnt/nas/music"]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibraryDefinition {
    #[serde(skip)]
    pub name: String,
    #[serde(default)]
    pub kind: LibraryKind,
    #[serde(default)]
    pub folders: Vec<PathBuf>,
}

impl LibraryDefinition {
    pub fn is_music(&self) -> bool {
        self.kind == LibraryKind::Music
    }
}

/// Expands library names into folder paths.
pub trait LibraryResolver: Send + Sync {
    /// The folders of library `name`. Platforms without libraries return an
    /// empty list.
    fn expand(&self, name: &str) -> Result<Vec<PathBuf>> {
        Ok(self.load(name)?.map(|d| d.folders).unwrap_or_default())
    }

    /// The definition of `name`; `Ok(None)` when there is no such library.
    fn load(&self, name: &str) -> Result<Option<LibraryDefinition>>;

    /// Every definition currently available. Unreadable ones are skipped.
    fn definitions(&self) -> Vec<LibraryDefinition>;

    /// Directory to watch for definition changes, if any.
    fn dir(&self) -> Option<&Path>;
}

/// [`LibraryResolver`] over a directory of `<name>.toml` definition files.
#[derive(Debug, Clone, Default)]
pub struct LibraryDir {
    dir: Option<PathBuf>,
}

impl LibraryDir {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    fn file_of(&self, name: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{name}.toml")))
    }
}

/// The library name a definition file stands for.
pub fn library_name(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("toml") {
        return None;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
}

impl LibraryResolver for LibraryDir {
    fn expand(&self, name: &str) -> Result<Vec<PathBuf>> {
        if self.dir.is_none() {
            return Ok(Vec::new());
        }
        match self.load(name)? {
            Some(def) => Ok(def.folders),
            None => Err(SyncError::library(name, "definition not found")),
        }
    }

    fn load(&self, name: &str) -> Result<Option<LibraryDefinition>> {
        let Some(file) = self.file_of(name) else {
            return Ok(None);
        };
        let text = match fs::read_to_string(&file) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SyncError::io(file, e)),
        };
        let mut def: LibraryDefinition =
            toml::from_str(&text).map_err(|e| SyncError::library(name, e))?;
        def.name = name.to_string();
        Ok(Some(def))
    }

    fn definitions(&self) -> Vec<LibraryDefinition> {
        let Some(dir) = &self.dir else {
            return Vec::new();
        };
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_file())
            .filter_map(|e| library_name(&e.path()))
            .collect();
        names.sort();

        names
            .into_iter()
            .filter_map(|name| match self.load(&name) {
                Ok(def) => def,
                Err(e) => {
                    tracing::warn!("Skipping library {}: {}", name, e);
                    None
                }
            })
            .collect()
    }

    fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}
