use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::library::{Collections, Metadata, MetadataReader, Track, TrackField};
use crate::paths::replace_prefix;

use super::events::{EventBus, FilesEvent, ModificationKind};
use super::lock;
use super::scanner::{ScanDecision, Verdict};

/// The track collections plus the two regions that serialise writers.
///
/// `collections` guards add/remove; `update_lock` serialises metadata
/// refreshes so a watcher update and a full pass never read the same file
/// twice. Metadata is read without holding `collections`.
pub struct TrackStore {
    collections: Mutex<Collections>,
    update_lock: Mutex<()>,
    reader: Arc<dyn MetadataReader>,
    events: EventBus,
}

impl TrackStore {
    pub fn new(collections: Collections, reader: Arc<dyn MetadataReader>, events: EventBus) -> Self {
        Self {
            collections: Mutex::new(collections),
            update_lock: Mutex::new(()),
            reader,
            events,
        }
    }

    pub fn apply(&self, decision: ScanDecision) {
        match decision.verdict {
            Verdict::Include => {
                self.add_file(&decision.path);
            }
            Verdict::Exclude => {
                self.remove_file(&decision.path);
            }
        }
    }

    /// Add a placeholder for `path` unless it is already in the library.
    pub fn add_file(&self, path: &Path) -> bool {
        let track = {
            let mut c = lock(&self.collections);
            if c.contains_file(path) {
                return false;
            }
            let track = Track::placeholder(path);
            c.files.push(track.clone());
            track
        };
        debug!("Added {}", path.display());
        self.events.publish(FilesEvent::SourceModified {
            track,
            kind: ModificationKind::Added,
        });
        true
    }

    pub fn remove_file(&self, path: &Path) -> bool {
        let removed = {
            let mut c = lock(&self.collections);
            match c.files.iter().position(|t| t.path == path) {
                Some(idx) => c.files.remove(idx),
                None => return false,
            }
        };
        debug!("Removed {}", path.display());
        self.events.publish(FilesEvent::SourceModified {
            track: removed,
            kind: ModificationKind::Removed,
        });
        true
    }

    /// Drop every track whose path is in `paths` from every collection.
    pub fn remove_everywhere(&self, paths: &[PathBuf]) -> usize {
        let removed: Vec<Track> = {
            let mut c = lock(&self.collections);
            for list in c.secondary_lists_mut() {
                list.retain(|t| !paths.contains(&t.path));
            }
            let (gone, kept): (Vec<Track>, Vec<Track>) = std::mem::take(&mut c.files)
                .into_iter()
                .partition(|t| paths.contains(&t.path));
            c.files = kept;
            gone
        };
        let count = removed.len();
        for track in removed {
            self.events.publish(FilesEvent::SourceModified {
                track,
                kind: ModificationKind::Removed,
            });
        }
        count
    }

    /// Rewrite the `from` prefix to `to` on every track of every collection.
    ///
    /// A renamed library track that collides with one already at its new
    /// path is dropped.
    pub fn rename_path(&self, from: &Path, to: &Path) -> usize {
        let mut renamed = Vec::new();
        {
            let mut c = lock(&self.collections);
            for list in c.lists_mut() {
                for track in list.iter_mut() {
                    if let Some(new) = replace_prefix(&track.path, from, to) {
                        track.path = new;
                        renamed.push(track.path.clone());
                    }
                }
            }
            let mut seen = std::collections::HashSet::new();
            c.files.retain(|t| seen.insert(t.path.clone()));
        }
        renamed.dedup();
        let count = renamed.len();
        for path in renamed {
            self.events.publish(FilesEvent::TrackModified {
                path,
                field: TrackField::Path,
            });
        }
        count
    }

    /// Re-read metadata of `path` if the file changed since the last read.
    ///
    /// Transient read failures leave the track untouched so a later pass
    /// retries; any other failure settles the track with fallback fields.
    pub fn update_track(&self, path: &Path) -> bool {
        let _updating = lock(&self.update_lock);

        let Some(current) = self.get(path) else {
            return false;
        };
        let modified = match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(e) => {
                debug!("Cannot stat {}: {}", path.display(), e);
                return false;
            }
        };
        if current.processed && !current.is_stale(modified) {
            return false;
        }

        let mut fresh = current;
        let meta = match self.reader.read(path) {
            Ok(meta) => meta,
            Err(e) if e.is_transient() => {
                warn!("Metadata of {} unavailable, retrying later: {}", path.display(), e);
                return false;
            }
            Err(e) => {
                debug!("{}", e);
                Metadata::default()
            }
        };
        let changed = fresh.apply_metadata(&meta);
        fresh.last_write = Some(modified);
        fresh.processed = true;

        {
            let mut c = lock(&self.collections);
            for list in c.lists_mut() {
                for track in list.iter_mut().filter(|t| t.path == path) {
                    track.copy_info_from(&fresh);
                }
            }
        }

        for field in changed {
            self.events.publish(FilesEvent::TrackModified {
                path: path.to_path_buf(),
                field,
            });
        }
        self.events.publish(FilesEvent::SourceModified {
            track: fresh,
            kind: ModificationKind::Updated,
        });
        true
    }

    pub fn get(&self, path: &Path) -> Option<Track> {
        lock(&self.collections).file(path).cloned()
    }

    pub fn contains(&self, path: &Path) -> bool {
        lock(&self.collections).contains_file(path)
    }

    pub fn file_paths(&self) -> Vec<PathBuf> {
        lock(&self.collections).files.iter().map(|t| t.path.clone()).collect()
    }

    /// Library tracks still waiting for their first metadata read.
    pub fn unprocessed(&self) -> Vec<PathBuf> {
        lock(&self.collections)
            .files
            .iter()
            .filter(|t| !t.processed)
            .map(|t| t.path.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Collections {
        lock(&self.collections).clone()
    }
}
