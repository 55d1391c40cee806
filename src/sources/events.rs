use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::library::{Track, TrackField};

use super::location::Location;
use super::lock;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ModificationKind {
    Added,
    Removed,
    Updated,
}

/// Stage of a reconciliation pass, reported with progress.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanPhase {
    Start,
    Refresh,
    Diff,
    Scan,
    Sweep,
    Metadata,
    Done,
}

/// Notifications published by [`Files`](super::Files).
#[derive(Debug, Clone, PartialEq)]
pub enum FilesEvent {
    SourceModified { track: Track, kind: ModificationKind },
    ProgressChanged { percent: u8, phase: ScanPhase },
    TrackModified { path: PathBuf, field: TrackField },
    PathRenamed { old: PathBuf, new: PathBuf },
    SourceAdded(Location),
    SourceRemoved(Location),
    /// The source list changed; carries the full list for persisting.
    SourcesChanged(Vec<Location>),
}

/// Fan-out of [`FilesEvent`]s to every live subscriber.
#[derive(Debug, Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<Sender<FilesEvent>>>>,
}

impl EventBus {
    pub fn subscribe(&self) -> Receiver<FilesEvent> {
        let (tx, rx) = mpsc::channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Send `event` to every subscriber, dropping those that hung up.
    pub fn publish(&self, event: FilesEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }
}
