use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::error::{Result, SyncError};
use crate::library::{Collections, Extensions, FormatSupport, LoftyReader, MetadataReader, Track};
use crate::paths::{full_path, hidden_below, is_descendant, replace_prefix, user_music_dir, watch_key};

use super::diff::{covering_roots, diff};
use super::events::{EventBus, FilesEvent, ScanPhase};
use super::forest::SourceForest;
use super::janitor::{Action, ChangeKind, Janitor, JanitorTask, Target, WatchEvent};
use super::libraries::{LibraryDir, LibraryResolver, library_name};
use super::location::{Location, LocationKind, SourceList};
use super::scanner::{CancelToken, PathScanner, ScanOutcome};
use super::scheduler::{self, Delays, Dispatch, DoneCallback, SchedulerMsg};
use super::store::TrackStore;
use super::{lock, read, write};

/// Configures and starts a [`Files`] service.
pub struct FilesBuilder {
    settings: Settings,
    libraries: Option<Arc<dyn LibraryResolver>>,
    reader: Option<Arc<dyn MetadataReader>>,
    formats: Option<Arc<dyn FormatSupport>>,
    collections: Collections,
    locations: Vec<Location>,
}

impl FilesBuilder {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            libraries: None,
            reader: None,
            formats: None,
            collections: Collections::default(),
            locations: Vec::new(),
        }
    }

    pub fn libraries(mut self, libraries: Arc<dyn LibraryResolver>) -> Self {
        self.libraries = Some(libraries);
        self
    }

    pub fn metadata_reader(mut self, reader: Arc<dyn MetadataReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn formats(mut self, formats: Arc<dyn FormatSupport>) -> Self {
        self.formats = Some(formats);
        self
    }

    /// Collections restored from a previous session.
    pub fn collections(mut self, collections: Collections) -> Self {
        self.collections = collections;
        self
    }

    pub fn locations(mut self, locations: impl IntoIterator<Item = Location>) -> Self {
        self.locations.extend(locations);
        self
    }

    /// Validate the settings and start the scheduler thread. No pass runs
    /// until one is requested.
    pub fn start(self) -> Result<Files> {
        self.settings.validate()?;
        let scanner_settings = self.settings.scanner;

        let formats = self
            .formats
            .unwrap_or_else(|| Arc::new(Extensions::new(&scanner_settings.extensions)));
        let reader = self.reader.unwrap_or_else(|| Arc::new(LoftyReader));
        let libraries = self
            .libraries
            .unwrap_or_else(|| Arc::new(LibraryDir::new(self.settings.libraries.dir.clone())));

        let events = EventBus::default();
        let (tx, rx) = mpsc::channel();
        let sources = SourceList::new(self.locations);

        let inner = Arc::new(Inner {
            scanner: PathScanner::new(
                Arc::clone(&formats),
                scanner_settings.follow_links,
                scanner_settings.include_hidden,
            ),
            watch: scanner_settings.watch,
            include_hidden: scanner_settings.include_hidden,
            auto_discover: self.settings.libraries.auto_discover,
            formats,
            libraries,
            store: TrackStore::new(self.collections, reader, events.clone()),
            sources: Mutex::new(sources),
            forest: RwLock::new(Arc::new(SourceForest::default())),
            baseline: RwLock::new(Arc::new(SourceForest::default())),
            janitor: Janitor::new(tx.clone()),
            worker: ScanWorker::default(),
            events,
            closing: CancelToken::new(),
            pending: Mutex::new(Pending::default()),
            tx,
        });
        inner.refresh_forest();

        if let Some(dir) = inner.libraries.dir().filter(|_| inner.watch) {
            if let Err(e) = inner.janitor.watch(dir) {
                warn!("Cannot watch library definitions in {}: {}", dir.display(), e);
            }
        }

        let delays = Delays {
            janitor: Duration::from_millis(scanner_settings.janitor_delay_ms),
            scan: Duration::from_millis(scanner_settings.scan_delay_ms),
        };
        let handle = scheduler::spawn(rx, Dispatcher(Arc::downgrade(&inner)), delays)?;

        Ok(Files {
            inner,
            scheduler: Mutex::new(Some(handle)),
        })
    }
}

/// The source manager: owns the source list, the track collections, the
/// watchers and the background scan worker.
///
/// Dropping it shuts everything down.
pub struct Files {
    inner: Arc<Inner>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Files {
    pub fn builder(settings: Settings) -> FilesBuilder {
        FilesBuilder::new(settings)
    }

    pub fn subscribe(&self) -> mpsc::Receiver<FilesEvent> {
        self.inner.events.subscribe()
    }

    /// Add `loc` (replacing an entry with the same identity) and schedule a
    /// pass; `on_done` runs when that pass finishes.
    pub fn add_source(&self, loc: Location, on_done: Option<DoneCallback>) -> Result<Location> {
        self.inner.ensure_open()?;
        let stored = lock(&self.inner.sources).add(loc);
        info!("Added source {} ({:?})", stored.data, stored.kind);
        self.inner.events.publish(FilesEvent::SourceAdded(stored.clone()));
        self.inner.sources_changed();
        self.inner.request_scan(on_done)?;
        Ok(stored)
    }

    /// Add a path, treating it as a file, a folder or a library name
    /// depending on what it names.
    pub fn add_source_path(&self, data: &str, on_done: Option<DoneCallback>) -> Result<Location> {
        self.add_source(Location::infer(data), on_done)
    }

    pub fn remove_source(&self, loc: &Location) -> Result<Option<Location>> {
        self.inner.ensure_open()?;
        let removed = self.inner.remove_location(loc);
        if removed.is_some() {
            self.inner.request_scan(None)?;
        }
        Ok(removed)
    }

    /// Flip a source between include and ignore. Returns the new `include`.
    pub fn toggle_source(&self, loc: &Location) -> Result<Option<bool>> {
        self.inner.ensure_open()?;
        let toggled = lock(&self.inner.sources).toggle(loc);
        if let Some(include) = toggled {
            info!("Source {} now {}", loc.data, if include { "included" } else { "ignored" });
            self.inner.sources_changed();
            self.inner.request_scan(None)?;
        }
        Ok(toggled)
    }

    pub fn get_source(&self, data: &str) -> Option<Location> {
        lock(&self.inner.sources).find(data).cloned()
    }

    pub fn sources(&self) -> Vec<Location> {
        lock(&self.inner.sources).to_vec()
    }

    pub fn is_path_included(&self, path: &Path) -> bool {
        self.inner.forest().path_is_added(&full_path(path))
    }

    pub fn is_path_ignored(&self, path: &Path) -> bool {
        self.inner.forest().path_is_ignored(&full_path(path))
    }

    pub fn track_is_added(&self, path: &Path) -> bool {
        self.inner.store.contains(&full_path(path))
    }

    pub fn get_track(&self, path: &Path) -> Option<Track> {
        self.inner.store.get(&full_path(path))
    }

    /// Distinct parent folders of `tracks`, sorted.
    pub fn folders_of(&self, tracks: &[PathBuf]) -> Vec<PathBuf> {
        tracks
            .iter()
            .filter_map(|t| t.parent().map(Path::to_path_buf))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Stop tracking `path`.
    ///
    /// An explicitly included source at exactly `path` is removed. If `path`
    /// is still included after that, ignore rules below it are folded into a
    /// new ignore source for `path`.
    pub fn ignore(&self, path: &Path) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.ignore(&full_path(path));
        self.inner.request_scan(None)
    }

    /// Remove `paths` from every collection and ignore the shortest paths that
    /// cover them without covering any remaining track.
    pub fn remove_tracks(&self, paths: &[PathBuf]) -> Result<()> {
        self.inner.ensure_open()?;
        let paths: Vec<PathBuf> = paths.iter().map(|p| full_path(p)).collect();
        self.inner.store.remove_everywhere(&paths);

        let forest = self.inner.forest();
        let remaining = self.inner.store.file_paths();
        let mut ignores = Vec::new();
        for path in &paths {
            let Some(root) = forest.closest(path).filter(|t| t.include) else {
                continue;
            };
            let mut widest = path.clone();
            for ancestor in path.ancestors().skip(1) {
                if !ancestor.starts_with(&root.path) || remaining.iter().any(|r| r.starts_with(ancestor)) {
                    break;
                }
                widest = ancestor.to_path_buf();
            }
            ignores.push(widest);
        }

        for path in covering_roots(ignores) {
            self.inner.ignore(&path);
        }
        self.inner.request_scan(None)
    }

    /// Sync automatic sources with the libraries on this machine.
    ///
    /// With a library directory, automatic libraries whose definition is gone
    /// are removed and every music library not yet present is added. Without
    /// one, the user's music folder is added if it exists.
    pub fn add_system_folders(&self) -> Result<()> {
        self.inner.ensure_open()?;
        let libraries = &self.inner.libraries;
        let mut changed = false;

        if libraries.dir().is_some() {
            let defs = libraries.definitions();
            let mut sources = lock(&self.inner.sources);
            let gone: Vec<Location> = sources
                .as_slice()
                .iter()
                .filter(|l| l.automatic && l.kind == LocationKind::Library)
                .filter(|l| !defs.iter().any(|d| d.name == l.data))
                .cloned()
                .collect();
            for loc in gone {
                sources.remove(&loc);
                self.inner.events.publish(FilesEvent::SourceRemoved(loc));
                changed = true;
            }
            if self.inner.auto_discover {
                for def in defs.iter().filter(|d| d.is_music()) {
                    if sources.find_kind(&def.name, LocationKind::Library).is_none() {
                        let loc = sources.add(Location::library(&def.name).automatic());
                        self.inner.events.publish(FilesEvent::SourceAdded(loc));
                        changed = true;
                    }
                }
            }
        } else if let Some(music) = user_music_dir().filter(|p| p.is_dir()) {
            let loc = Location::folder(&music).automatic();
            let mut sources = lock(&self.inner.sources);
            if !sources.contains(&loc) {
                let loc = sources.add(loc);
                self.inner.events.publish(FilesEvent::SourceAdded(loc));
                changed = true;
            }
        }

        if changed {
            self.inner.sources_changed();
            self.inner.request_scan(None)?;
        }
        Ok(())
    }

    /// Start a pass now, cancelling any pass in flight.
    pub fn scan_sources(&self, on_done: Option<DoneCallback>) -> Result<()> {
        self.inner.ensure_open()?;
        Arc::clone(&self.inner).start_pass(false, on_done.into_iter().collect())
    }

    /// Start a pass once source changes have been quiet for the scan delay.
    pub fn scan_sources_with_delay(&self, on_done: Option<DoneCallback>) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner.request_scan(on_done)
    }

    /// Run a pass and wait for it to finish. Fails with
    /// [`SyncError::ShutDown`] if the service shuts down first.
    pub fn scan_sources_blocking(&self) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        self.scan_sources(Some(Box::new(move || {
            let _ = tx.send(());
        })))?;
        rx.recv().map_err(|_| SyncError::ShutDown)
    }

    pub fn stop_scan(&self) {
        self.inner.worker.stop();
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.worker.is_running()
    }

    /// Rebuild the forest used by path queries from the current source list.
    /// Tracks are not touched.
    pub fn refresh_forest(&self) {
        self.inner.refresh_forest();
    }

    pub fn forest(&self) -> Arc<SourceForest> {
        self.inner.forest()
    }

    /// Re-read the metadata of one track if its file changed.
    pub fn update_track(&self, path: &Path) -> bool {
        self.inner.store.update_track(&full_path(path))
    }

    pub fn collections(&self) -> Collections {
        self.inner.store.snapshot()
    }

    /// Keys currently watched for changes.
    pub fn watched(&self) -> Vec<PathBuf> {
        self.inner.janitor.watched()
    }

    /// Queue janitor tasks as if a watcher had produced them.
    pub fn queue_tasks(&self, tasks: Vec<JanitorTask>) -> Result<()> {
        self.inner.ensure_open()?;
        self.inner
            .tx
            .send(SchedulerMsg::Tasks(tasks))
            .map_err(|_| SyncError::ShutDown)
    }

    /// Stop the scheduler, the scan worker and every watcher.
    pub fn shutdown(&self) {
        let Some(handle) = lock(&self.scheduler).take() else {
            return;
        };
        info!("Shutting down files service");
        self.inner.closing.cancel();
        let _ = self.inner.tx.send(SchedulerMsg::Shutdown);
        let _ = handle.join();
        self.inner.worker.stop();
        // Dropping parked callbacks wakes anyone waiting on them.
        *lock(&self.inner.pending) = Pending::default();
        self.inner.janitor.clear();
    }

    #[cfg(test)]
    pub(crate) fn dispatch(&self, tasks: Vec<JanitorTask>) {
        self.inner.run_tasks(tasks);
    }

    #[cfg(test)]
    pub(crate) fn classify(&self, event: WatchEvent) -> Option<JanitorTask> {
        self.inner.classify(event)
    }
}

impl Drop for Files {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Work carried from a cancelled pass into the next one.
#[derive(Default)]
struct Pending {
    full: bool,
    callbacks: Vec<DoneCallback>,
}

struct Inner {
    scanner: PathScanner,
    watch: bool,
    include_hidden: bool,
    auto_discover: bool,
    formats: Arc<dyn FormatSupport>,
    libraries: Arc<dyn LibraryResolver>,
    store: TrackStore,
    sources: Mutex<SourceList>,
    /// Forest of the current source list, for path queries.
    forest: RwLock<Arc<SourceForest>>,
    /// Forest committed by the last completed pass, for diffing.
    baseline: RwLock<Arc<SourceForest>>,
    janitor: Janitor,
    worker: ScanWorker,
    events: EventBus,
    closing: CancelToken,
    pending: Mutex<Pending>,
    tx: Sender<SchedulerMsg>,
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.closing.is_cancelled() {
            Err(SyncError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn forest(&self) -> Arc<SourceForest> {
        Arc::clone(&read(&self.forest))
    }

    fn build_forest(&self) -> SourceForest {
        let locations = lock(&self.sources).to_vec();
        SourceForest::build(&locations, self.libraries.as_ref())
    }

    fn refresh_forest(&self) {
        let forest = Arc::new(self.build_forest());
        *write(&self.forest) = forest;
    }

    fn sources_changed(&self) {
        self.refresh_forest();
        let list = lock(&self.sources).to_vec();
        self.events.publish(FilesEvent::SourcesChanged(list));
    }

    fn request_scan(&self, on_done: Option<DoneCallback>) -> Result<()> {
        self.tx
            .send(SchedulerMsg::ScanRequest(on_done))
            .map_err(|_| SyncError::ShutDown)
    }

    fn progress(&self, percent: u8, phase: ScanPhase) {
        self.events.publish(FilesEvent::ProgressChanged { percent, phase });
    }

    fn remove_location(&self, loc: &Location) -> Option<Location> {
        let removed = lock(&self.sources).remove(loc)?;
        info!("Removed source {} ({:?})", removed.data, removed.kind);
        self.events.publish(FilesEvent::SourceRemoved(removed.clone()));
        self.sources_changed();
        Some(removed)
    }

    fn ignore(&self, path: &Path) {
        let data = path.to_string_lossy().into_owned();
        {
            let mut sources = lock(&self.sources);
            let explicit = sources
                .as_slice()
                .iter()
                .find(|l| l.include && l.path().as_deref() == Some(path))
                .cloned();
            if let Some(loc) = explicit {
                sources.remove(&loc);
                self.events.publish(FilesEvent::SourceRemoved(loc));
            }
        }
        self.refresh_forest();

        if self.forest().path_is_added(path) {
            let mut sources = lock(&self.sources);
            sources.retain(|l| !(l.ignore() && l.path().is_some_and(|p| is_descendant(&p, path))));
            let kind = if path.is_file() {
                LocationKind::File
            } else {
                LocationKind::Folder
            };
            let loc = sources.add(Location::new(data, kind).ignored());
            info!("Ignoring {}", loc.data);
            self.events.publish(FilesEvent::SourceAdded(loc));
        }
        self.sources_changed();
    }

    /// Run a reconciliation pass on the scan worker, replacing any pass in
    /// flight. A full pass rescans every source, not only the changed ones.
    fn start_pass(self: Arc<Self>, full: bool, callbacks: Vec<DoneCallback>) -> Result<()> {
        {
            let mut pending = lock(&self.pending);
            pending.full |= full;
            pending.callbacks.extend(callbacks);
        }
        let token = self.closing.child();
        let pass_token = token.clone();
        let inner = Arc::clone(&self);
        self.worker.start(token, move || inner.run_pass(&pass_token))
    }

    fn run_pass(&self, token: &CancelToken) {
        let callbacks = {
            let _running = lock(&self.worker.running);
            let Pending { full, callbacks } = std::mem::take(&mut *lock(&self.pending));

            match self.reconcile(full, token) {
                ScanOutcome::Completed => callbacks,
                ScanOutcome::Cancelled => {
                    debug!("Scan pass cancelled");
                    let mut pending = lock(&self.pending);
                    pending.full |= full;
                    pending.callbacks.extend(callbacks);
                    return;
                }
            }
        };

        for done in callbacks {
            done();
        }
    }

    fn reconcile(&self, full: bool, token: &CancelToken) -> ScanOutcome {
        if token.is_cancelled() {
            return ScanOutcome::Cancelled;
        }
        info!("Scanning sources{}", if full { " (full)" } else { "" });
        self.progress(0, ScanPhase::Start);

        self.progress(5, ScanPhase::Refresh);
        for path in self.store.file_paths() {
            if token.is_cancelled() {
                return ScanOutcome::Cancelled;
            }
            self.store.update_track(&path);
        }

        self.progress(20, ScanPhase::Diff);
        let forest = Arc::new(self.build_forest());
        let baseline = Arc::clone(&read(&self.baseline));
        let changes = diff(&baseline, &forest);
        let roots = if full {
            let mut all = changes.scan_roots();
            all.extend(forest.trees.iter().map(|t| t.path.clone()));
            covering_roots(all)
        } else {
            changes.scan_roots()
        };
        debug!(
            "{} added, {} removed, {} root(s) to scan",
            changes.added.len(),
            changes.removed.len(),
            roots.len()
        );

        if token.is_cancelled() {
            return ScanOutcome::Cancelled;
        }
        if self.watch {
            self.sync_watchers(&forest);
        }

        self.progress(30, ScanPhase::Scan);
        for (i, root) in roots.iter().enumerate() {
            let node = forest.subtree_for(root);
            let outcome = self
                .scanner
                .scan(root, &node, true, token, |d| self.store.apply(d));
            if outcome == ScanOutcome::Cancelled {
                return ScanOutcome::Cancelled;
            }
            self.progress(scaled(30, 40, i + 1, roots.len()), ScanPhase::Scan);
        }

        self.progress(70, ScanPhase::Sweep);
        let doomed: Vec<PathBuf> = self
            .store
            .file_paths()
            .into_iter()
            .filter(|p| {
                !forest.path_is_added(p)
                    || self.hidden_in(&forest, p)
                    || !self.formats.is_supported(p)
                    || !p.is_file()
            })
            .collect();
        for path in &doomed {
            self.store.remove_file(path);
        }
        debug!("Swept {} track(s)", doomed.len());

        self.progress(80, ScanPhase::Metadata);
        let unprocessed = self.store.unprocessed();
        for (i, path) in unprocessed.iter().enumerate() {
            if token.is_cancelled() {
                return ScanOutcome::Cancelled;
            }
            self.store.update_track(path);
            self.progress(scaled(80, 20, i + 1, unprocessed.len()), ScanPhase::Metadata);
        }

        *write(&self.baseline) = forest;
        self.progress(100, ScanPhase::Done);
        info!("Scan finished");
        ScanOutcome::Completed
    }

    /// Watch the top-level trees that include anything, dropping watchers
    /// no included root needs anymore.
    fn sync_watchers(&self, forest: &SourceForest) {
        let mut desired: Vec<PathBuf> = Vec::new();
        for tree in forest.trees.iter().filter(|t| t.has_included()) {
            let key = watch_key(&tree.path, &tree.path);
            if !desired.contains(&key) {
                desired.push(key);
            }
        }
        self.janitor.sync(&desired, self.libraries.dir());
    }

    /// Whether `path` lies in a hidden entry below its top-level source while
    /// hidden entries are skipped.
    fn hidden_in(&self, forest: &SourceForest, path: &Path) -> bool {
        !self.include_hidden
            && forest
                .top_level_of(path)
                .is_some_and(|top| hidden_below(path, &top.path))
    }

    fn classify(&self, event: WatchEvent) -> Option<JanitorTask> {
        if let Some(task) = self.classify_library(&event) {
            return Some(task);
        }

        let forest = self.forest();
        let visible = |p: &Path| forest.closest(p).is_some() && !self.hidden_in(&forest, p);
        let supported = |p: &Path| self.formats.is_supported(p);

        match event.kind {
            // A move into a hidden folder still has to evict what it carried.
            ChangeKind::Renamed => {
                let from = event.from?;
                if !visible(&from) && !visible(&event.path) {
                    return None;
                }
                let is_dir = event.is_dir.unwrap_or_else(|| event.path.is_dir());
                if is_dir {
                    Some(JanitorTask::rename(Target::Folder, from, event.path))
                } else if supported(&from) || supported(&event.path) {
                    Some(JanitorTask::rename(Target::File, from, event.path))
                } else {
                    None
                }
            }
            _ if !visible(&event.path) => None,
            ChangeKind::Created => {
                let is_dir = event.is_dir.unwrap_or_else(|| event.path.is_dir());
                if is_dir {
                    Some(JanitorTask::new(Action::Create, Target::Folder, event.path))
                } else if supported(&event.path) {
                    Some(JanitorTask::new(Action::Create, Target::File, event.path))
                } else {
                    None
                }
            }
            ChangeKind::Deleted => {
                // The path is gone, so guess from what we know about it.
                let is_dir = event.is_dir.unwrap_or_else(|| {
                    event.path.extension().is_none()
                        || self
                            .store
                            .file_paths()
                            .iter()
                            .any(|t| is_descendant(t, &event.path))
                });
                if is_dir {
                    Some(JanitorTask::new(Action::Delete, Target::Folder, event.path))
                } else if supported(&event.path) {
                    Some(JanitorTask::new(Action::Delete, Target::File, event.path))
                } else {
                    None
                }
            }
            ChangeKind::Changed => {
                if event.path.is_dir() || !supported(&event.path) {
                    None
                } else {
                    Some(JanitorTask::new(Action::Update, Target::File, event.path))
                }
            }
        }
    }

    fn classify_library(&self, event: &WatchEvent) -> Option<JanitorTask> {
        let dir = self.libraries.dir()?;
        let is_definition = |p: &Path| p.parent() == Some(dir) && library_name(p).is_some();
        let touches = is_definition(&event.path) || event.from.as_deref().is_some_and(is_definition);
        if !touches {
            return None;
        }

        let action = match event.kind {
            ChangeKind::Created => Action::Create,
            ChangeKind::Deleted => Action::Delete,
            ChangeKind::Changed => Action::Update,
            ChangeKind::Renamed => {
                return Some(JanitorTask::rename(
                    Target::Library,
                    event.from.clone()?,
                    event.path.clone(),
                ));
            }
        };
        Some(JanitorTask::new(action, Target::Library, event.path.clone()))
    }

    fn run_tasks(self: &Arc<Self>, tasks: Vec<JanitorTask>) {
        let mut full = false;
        let mut rescan = false;

        for task in tasks {
            if self.closing.is_cancelled() {
                return;
            }
            debug!("Janitor: {:?} {:?} {}", task.job.action, task.job.target, task.path.display());
            match (task.job.target, task.job.action) {
                (Target::File, Action::Create | Action::Update) => self.scan_file(&task.path),
                (Target::File, Action::Delete) => {
                    self.store.remove_file(&task.path);
                }
                (Target::Folder, Action::Create | Action::Delete) => full = true,
                (Target::File | Target::Folder, Action::Rename) => {
                    if let Some(from) = &task.from {
                        rescan |= self.rename(from, &task.path);
                    }
                }
                (Target::Library, action) => rescan |= self.library_task(action, &task),
                (Target::Folder, Action::Update) => {}
            }
        }

        if full {
            if let Err(e) = Arc::clone(self).start_pass(true, Vec::new()) {
                warn!("Cannot start scan: {}", e);
            }
        } else if rescan {
            if let Err(e) = self.request_scan(None) {
                debug!("{}", e);
            }
        }
    }

    /// Rescan one path. A path that is gone or hidden loses every track at
    /// or below it.
    fn scan_file(&self, path: &Path) {
        let forest = self.forest();
        if !path.exists() || self.hidden_in(&forest, path) {
            self.evict(path);
            return;
        }
        let node = forest.subtree_for(path);
        let token = self.closing.child();
        self.scanner
            .scan(path, &node, true, &token, |d| self.store.apply(d));
        self.store.update_track(path);
    }

    fn evict(&self, path: &Path) {
        let doomed: Vec<PathBuf> = self
            .store
            .file_paths()
            .into_iter()
            .filter(|t| t.starts_with(path))
            .collect();
        for track in &doomed {
            self.store.remove_file(track);
        }
    }

    /// Follow a rename everywhere. Returns whether a source moved with it.
    fn rename(&self, from: &Path, to: &Path) -> bool {
        let renamed = self.store.rename_path(from, to);
        debug!("Renamed {} track(s) from {} to {}", renamed, from.display(), to.display());
        self.events.publish(FilesEvent::PathRenamed {
            old: from.to_path_buf(),
            new: to.to_path_buf(),
        });

        let mut moved = false;
        {
            let mut sources = lock(&self.sources);
            let affected: Vec<Location> = sources
                .as_slice()
                .iter()
                .filter(|l| l.path().is_some_and(|p| p.starts_with(from)))
                .cloned()
                .collect();
            for loc in affected {
                if let Some(new) = loc.path().and_then(|p| replace_prefix(&p, from, to)) {
                    moved |= sources.rename(&loc.data, loc.kind, &new.to_string_lossy());
                }
            }
        }
        if moved {
            self.sources_changed();
        }

        // Files may have moved into or out of coverage.
        self.scan_file(to);
        moved
    }

    /// Apply a library definition change. Returns whether a rescan is needed.
    fn library_task(&self, action: Action, task: &JanitorTask) -> bool {
        let Some(name) = library_name(&task.path) else {
            return false;
        };
        let existing = lock(&self.sources)
            .find_kind(&name, LocationKind::Library)
            .cloned();

        match action {
            Action::Create => self.maybe_add_library(&name),
            Action::Delete => existing.and_then(|l| self.remove_location(&l)).is_some(),
            Action::Rename => {
                let Some(old) = task.from.as_deref().and_then(library_name) else {
                    return false;
                };
                let renamed = lock(&self.sources).rename(&old, LocationKind::Library, &name);
                if renamed {
                    self.sources_changed();
                }
                renamed
            }
            Action::Update => match (self.libraries.load(&name), existing) {
                (Ok(Some(def)), Some(loc)) if !def.is_music() && loc.automatic => {
                    self.remove_location(&loc).is_some()
                }
                (Ok(_), Some(_)) => {
                    self.refresh_forest();
                    true
                }
                (Ok(_), None) => self.maybe_add_library(&name),
                (Err(e), _) => {
                    warn!("Skipping library {}: {}", name, e);
                    false
                }
            },
        }
    }

    fn maybe_add_library(&self, name: &str) -> bool {
        if !self.auto_discover {
            return false;
        }
        match self.libraries.load(name) {
            Ok(Some(def)) if def.is_music() => {
                let loc = {
                    let mut sources = lock(&self.sources);
                    if sources.find_kind(name, LocationKind::Library).is_some() {
                        return false;
                    }
                    sources.add(Location::library(name).automatic())
                };
                info!("Discovered library {}", name);
                self.events.publish(FilesEvent::SourceAdded(loc));
                self.sources_changed();
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("Skipping library {}: {}", name, e);
                false
            }
        }
    }
}

fn scaled(base: u8, span: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return base + span;
    }
    let step = (span as usize * done / total).min(span as usize);
    base + step as u8
}

/// Scheduler-side handle. Holds the service weakly so the scheduler thread
/// never keeps it alive.
struct Dispatcher(Weak<Inner>);

impl Dispatch for Dispatcher {
    fn classify(&self, event: WatchEvent) -> Option<JanitorTask> {
        self.0.upgrade()?.classify(event)
    }

    fn run_tasks(&self, tasks: Vec<JanitorTask>) {
        if let Some(inner) = self.0.upgrade() {
            inner.run_tasks(tasks);
        }
    }

    fn scan_now(&self, callbacks: Vec<DoneCallback>) {
        let Some(inner) = self.0.upgrade() else {
            return;
        };
        if let Err(e) = inner.start_pass(false, callbacks) {
            warn!("Cannot start scan: {}", e);
        }
    }
}

/// Runs reconciliation passes on their own threads, one at a time.
///
/// Starting a pass cancels the ones in flight without waiting for them. A
/// pass only reconciles while holding `running`; its callbacks run after it
/// lets go.
#[derive(Default)]
struct ScanWorker {
    running: Mutex<()>,
    threads: Mutex<Vec<(CancelToken, JoinHandle<()>)>>,
}

impl ScanWorker {
    fn start<F>(&self, token: CancelToken, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut threads = lock(&self.threads);
        threads.retain(|(_, handle)| !handle.is_finished());
        for (previous, _) in threads.iter() {
            previous.cancel();
        }
        let handle = thread::Builder::new()
            .name("tracksync-scan".into())
            .spawn(job)
            .map_err(SyncError::Spawn)?;
        threads.push((token, handle));
        Ok(())
    }

    /// Cancel every pass and wait for them to exit.
    fn stop(&self) {
        let threads = std::mem::take(&mut *lock(&self.threads));
        for (token, _) in &threads {
            token.cancel();
        }
        // A callback may stop the scan from the pass thread itself.
        let me = thread::current().id();
        for (_, handle) in threads {
            if handle.thread().id() != me {
                let _ = handle.join();
            }
        }
    }

    fn is_running(&self) -> bool {
        lock(&self.threads)
            .iter()
            .any(|(_, handle)| !handle.is_finished())
    }
}
