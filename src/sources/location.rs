use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::paths::full_path;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationKind {
    File,
    #[default]
    Folder,
    /// A named collection of folders, expanded through a
    /// [`LibraryResolver`](super::LibraryResolver).
    Library,
}

/// A user-configured scan root.
///
/// Identity is `(data, kind)`; `id` only labels the entry for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(default)]
    pub id: u64,
    /// A path for files and folders, a name for libraries.
    #[serde(alias = "path")]
    pub data: String,
    #[serde(default)]
    pub kind: LocationKind,
    #[serde(default = "default_include")]
    pub include: bool,
    /// Added by library discovery rather than by the user.
    #[serde(default)]
    pub automatic: bool,
}

fn default_include() -> bool {
    true
}

impl Location {
    pub fn new(data: impl Into<String>, kind: LocationKind) -> Self {
        let data = data.into();
        let data = match kind {
            LocationKind::Library => data,
            LocationKind::File | LocationKind::Folder => {
                full_path(Path::new(&data)).to_string_lossy().into_owned()
            }
        };
        Self {
            id: 0,
            data,
            kind,
            include: true,
            automatic: false,
        }
    }

    pub fn folder(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref().to_string_lossy(), LocationKind::Folder)
    }

    pub fn file(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref().to_string_lossy(), LocationKind::File)
    }

    pub fn library(name: impl Into<String>) -> Self {
        Self::new(name, LocationKind::Library)
    }

    /// Infer the kind from what exists on disk: a file, a folder, or else a
    /// library name.
    pub fn infer(data: &str) -> Self {
        let path = Path::new(data);
        if path.is_file() {
            Self::file(path)
        } else if path.is_dir() {
            Self::folder(path)
        } else {
            Self::library(data)
        }
    }

    pub fn ignored(mut self) -> Self {
        self.include = false;
        self
    }

    pub fn automatic(mut self) -> Self {
        self.automatic = true;
        self
    }

    pub fn ignore(&self) -> bool {
        !self.include
    }

    pub fn same_source(&self, other: &Location) -> bool {
        self.data == other.data && self.kind == other.kind
    }

    /// The filesystem path for file and folder locations.
    pub fn path(&self) -> Option<PathBuf> {
        match self.kind {
            LocationKind::Library => None,
            LocationKind::File | LocationKind::Folder => Some(full_path(Path::new(&self.data))),
        }
    }
}

/// The ordered list of configured locations.
#[derive(Debug, Clone, Default)]
pub struct SourceList {
    items: Vec<Location>,
    next_id: u64,
}

impl SourceList {
    pub fn new(items: impl IntoIterator<Item = Location>) -> Self {
        let mut list = Self::default();
        for loc in items {
            list.add(loc);
        }
        list
    }

    /// Append `loc`, replacing any entry with the same identity.
    /// Returns the stored location with its id assigned.
    pub fn add(&mut self, mut loc: Location) -> Location {
        // Normalise paths that came in through deserialisation.
        if let Some(path) = loc.path() {
            loc.data = path.to_string_lossy().into_owned();
        }
        self.items.retain(|l| !l.same_source(&loc));
        self.next_id += 1;
        loc.id = self.next_id;
        self.items.push(loc.clone());
        loc
    }

    pub fn remove(&mut self, loc: &Location) -> Option<Location> {
        let idx = self.items.iter().position(|l| l.same_source(loc))?;
        Some(self.items.remove(idx))
    }

    /// First location whose `data` equals `data`, whatever its kind.
    pub fn find(&self, data: &str) -> Option<&Location> {
        self.items.iter().find(|l| l.data == data)
    }

    pub fn find_kind(&self, data: &str, kind: LocationKind) -> Option<&Location> {
        self.items.iter().find(|l| l.data == data && l.kind == kind)
    }

    pub fn contains(&self, loc: &Location) -> bool {
        self.items.iter().any(|l| l.same_source(loc))
    }

    /// Flip include/ignore. Returns the new `include` value.
    pub fn toggle(&mut self, loc: &Location) -> Option<bool> {
        let item = self.items.iter_mut().find(|l| l.same_source(loc))?;
        item.include = !item.include;
        Some(item.include)
    }

    /// Change the `data` of the `kind` location currently called `old`.
    pub fn rename(&mut self, old: &str, kind: LocationKind, new: &str) -> bool {
        match self.items.iter_mut().find(|l| l.data == old && l.kind == kind) {
            Some(item) => {
                item.data = new.to_string();
                true
            }
            None => false,
        }
    }

    pub fn retain(&mut self, keep: impl FnMut(&Location) -> bool) {
        self.items.retain(keep);
    }

    pub fn as_slice(&self) -> &[Location] {
        &self.items
    }

    pub fn to_vec(&self) -> Vec<Location> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
