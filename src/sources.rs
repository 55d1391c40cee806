//! Source management: which paths feed the track collection, and the machinery
//! that keeps the collection in step with them.
//!
//! A pass rebuilds the [`SourceForest`] from the [`Location`] list, diffs it
//! against the last committed forest, rescans only the changed subtrees and
//! sweeps tracks no longer covered. Filesystem watchers feed the same
//! machinery through the debounced scheduler.

mod diff;
mod events;
mod forest;
mod janitor;
mod libraries;
mod location;
mod scanner;
mod scheduler;
mod service;
mod store;

pub use diff::{ForestDiff, covering_roots, diff};
pub use events::{EventBus, FilesEvent, ModificationKind, ScanPhase};
pub use forest::{SourceForest, SourceTree};
pub use janitor::{Action, ChangeKind, JanitorJob, JanitorTask, Target, WatchEvent};
pub use libraries::{LibraryDefinition, LibraryDir, LibraryKind, LibraryResolver, library_name};
pub use location::{Location, LocationKind, SourceList};
pub use scanner::{CancelToken, PathScanner, ScanDecision, ScanOutcome, Verdict};
pub use scheduler::{Delays, DoneCallback, TaskQueue};
pub use service::{Files, FilesBuilder};
pub use store::TrackStore;

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Lock `m`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests;
