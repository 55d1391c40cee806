//! Filesystem change subscriptions and the tasks they turn into.
//!
//! Watcher callbacks run on `notify`'s delivery threads; they only translate
//! the raw event and send it to the scheduler.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::mpsc::Sender;

use notify::event::{CreateKind, EventKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::error::Result;

use super::lock;
use super::scheduler::SchedulerMsg;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Create,
    Delete,
    Rename,
    Update,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    File,
    Folder,
    Library,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct JanitorJob {
    pub action: Action,
    pub target: Target,
}

impl JanitorJob {
    pub const fn new(action: Action, target: Target) -> Self {
        Self { action, target }
    }
}

/// A queued reaction to a filesystem change. `from` is set for renames.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JanitorTask {
    pub job: JanitorJob,
    pub path: PathBuf,
    pub from: Option<PathBuf>,
}

impl JanitorTask {
    pub fn new(action: Action, target: Target, path: impl Into<PathBuf>) -> Self {
        Self {
            job: JanitorJob::new(action, target),
            path: path.into(),
            from: None,
        }
    }

    pub fn rename(target: Target, from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self {
            job: JanitorJob::new(Action::Rename, target),
            path: to.into(),
            from: Some(from.into()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Deleted,
    Changed,
    Renamed,
}

/// A raw change notification, reduced to what the scheduler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: ChangeKind,
    pub path: PathBuf,
    pub from: Option<PathBuf>,
    /// Whether the backend said the path is a directory, when it knows.
    pub is_dir: Option<bool>,
}

impl WatchEvent {
    pub fn new(kind: ChangeKind, path: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            path: path.into(),
            from: None,
            is_dir: None,
        }
    }

    /// Translate a `notify` event. Access and unclassified events are dropped.
    pub fn from_notify(event: Event) -> Vec<WatchEvent> {
        let kind = event.kind;
        let mut paths = event.paths.into_iter();

        let (change, is_dir) = match kind {
            EventKind::Create(k) => (ChangeKind::Created, create_is_dir(k)),
            EventKind::Remove(k) => (ChangeKind::Deleted, remove_is_dir(k)),
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                let (Some(from), Some(to)) = (paths.next(), paths.next()) else {
                    return Vec::new();
                };
                return vec![WatchEvent {
                    kind: ChangeKind::Renamed,
                    path: to,
                    from: Some(from),
                    is_dir: None,
                }];
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => (ChangeKind::Deleted, None),
            EventKind::Modify(ModifyKind::Name(RenameMode::To)) => (ChangeKind::Created, None),
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Metadata(_) | ModifyKind::Any) => {
                (ChangeKind::Changed, None)
            }
            _ => return Vec::new(),
        };

        paths
            .map(|path| WatchEvent {
                kind: change,
                path,
                from: None,
                is_dir,
            })
            .collect()
    }
}

fn create_is_dir(kind: CreateKind) -> Option<bool> {
    match kind {
        CreateKind::Folder => Some(true),
        CreateKind::File => Some(false),
        _ => None,
    }
}

fn remove_is_dir(kind: RemoveKind) -> Option<bool> {
    match kind {
        RemoveKind::Folder => Some(true),
        RemoveKind::File => Some(false),
        _ => None,
    }
}

/// One recursive watcher per watch key.
pub struct Janitor {
    tx: Sender<SchedulerMsg>,
    watchers: Mutex<HashMap<PathBuf, RecommendedWatcher>>,
}

impl Janitor {
    pub fn new(tx: Sender<SchedulerMsg>) -> Self {
        Self {
            tx,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Start watching `key` recursively. Watching an already watched key is a
    /// no-op.
    pub fn watch(&self, key: &Path) -> Result<()> {
        let mut watchers = lock(&self.watchers);
        if watchers.contains_key(key) {
            return Ok(());
        }

        let tx = self.tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for change in WatchEvent::from_notify(event) {
                    if tx.send(SchedulerMsg::Fs(change)).is_err() {
                        // Scheduler is gone; the service is shutting down.
                        return;
                    }
                }
            }
            Err(e) => warn!("Watch error: {}", e),
        })?;
        watcher.watch(key, RecursiveMode::Recursive)?;

        info!("Watching path: {}", key.display());
        watchers.insert(key.to_path_buf(), watcher);
        Ok(())
    }

    pub fn unwatch(&self, key: &Path) {
        if lock(&self.watchers).remove(key).is_some() {
            debug!("Stopped watching {}", key.display());
        }
    }

    pub fn watched(&self) -> Vec<PathBuf> {
        let mut keys: Vec<PathBuf> = lock(&self.watchers).keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Keep exactly the `desired` keys watched, plus any key in `keep`.
    pub fn sync(&self, desired: &[PathBuf], keep: Option<&Path>) {
        for key in self.watched() {
            let wanted = desired.contains(&key) || keep.is_some_and(|k| k == key);
            if !wanted {
                self.unwatch(&key);
            }
        }
        for key in desired {
            if let Err(e) = self.watch(key) {
                warn!("Cannot watch {}: {}", key.display(), e);
            }
        }
    }

    pub fn clear(&self) {
        lock(&self.watchers).clear();
    }
}
