use super::*;
use crate::config::Settings;
use crate::error::{Result, SyncError};
use crate::library::{Collections, Extensions, FormatSupport, Metadata, MetadataReader, Playlist, Track};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

struct StubReader;

impl MetadataReader for StubReader {
    fn read(&self, _path: &Path) -> Result<Metadata> {
        Ok(Metadata {
            artist: Some("Stub".into()),
            ..Metadata::default()
        })
    }
}

fn settings() -> Settings {
    let mut s = Settings::default();
    s.scanner.watch = false;
    s.scanner.janitor_delay_ms = 10;
    s.scanner.scan_delay_ms = 10;
    s.scanner.extensions = vec!["mp3".into()];
    s
}

fn start(settings: Settings, locations: Vec<Location>, collections: Collections) -> Files {
    Files::builder(settings)
        .metadata_reader(Arc::new(StubReader))
        .collections(collections)
        .locations(locations)
        .start()
        .unwrap()
}

fn touch(path: &Path) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, b"x").unwrap();
}

fn library(files: &Files) -> BTreeSet<PathBuf> {
    files.collections().files.into_iter().map(|t| t.path).collect()
}

fn set(paths: &[PathBuf]) -> BTreeSet<PathBuf> {
    paths.iter().cloned().collect()
}

/// Added/removed tracks reported on `rx` so far.
fn modifications(rx: &Receiver<FilesEvent>) -> Vec<(PathBuf, ModificationKind)> {
    rx.try_iter()
        .filter_map(|e| match e {
            FilesEvent::SourceModified { track, kind } if kind != ModificationKind::Updated => {
                Some((track.path, kind))
            }
            _ => None,
        })
        .collect()
}

/// Supports `.mp3` and stalls the first lookup of `gate.mp3` until released,
/// or for half a second. `reached` fires when the stall begins.
struct Gate {
    stalled: AtomicBool,
    reached: Mutex<mpsc::Sender<()>>,
    open_tx: Mutex<mpsc::Sender<()>>,
    open_rx: Mutex<Receiver<()>>,
}

impl Gate {
    fn new() -> (Arc<Self>, Receiver<()>) {
        let (reached, reached_rx) = mpsc::channel();
        let (open_tx, open_rx) = mpsc::channel();
        let gate = Gate {
            stalled: AtomicBool::new(false),
            reached: Mutex::new(reached),
            open_tx: Mutex::new(open_tx),
            open_rx: Mutex::new(open_rx),
        };
        (Arc::new(gate), reached_rx)
    }

    fn open(&self) {
        let _ = lock(&self.open_tx).send(());
    }
}

impl FormatSupport for Gate {
    fn is_supported(&self, path: &Path) -> bool {
        let name = path.file_name().and_then(|n| n.to_str());
        if name == Some("gate.mp3") && !self.stalled.swap(true, Ordering::SeqCst) {
            let _ = lock(&self.reached).send(());
            let _ = lock(&self.open_rx).recv_timeout(Duration::from_millis(500));
        }
        path.extension().and_then(|e| e.to_str()) == Some("mp3")
    }
}

/// A service over `root` holding `a.mp3`, `gate.mp3` and `z.mp3`, whose
/// first pass stalls on `gate.mp3`.
fn start_gated(settings: Settings, root: &Path) -> (Files, Arc<Gate>, Receiver<()>) {
    for name in ["a.mp3", "gate.mp3", "z.mp3"] {
        touch(&root.join(name));
    }
    let (gate, reached) = Gate::new();
    let files = Files::builder(settings)
        .metadata_reader(Arc::new(StubReader))
        .formats(gate.clone())
        .locations([Location::folder(root)])
        .start()
        .unwrap();
    (files, gate, reached)
}

#[test]
fn ignored_child_then_toggle_adds_only_the_child() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("A");
    let one = a.join("1.mp3");
    let two = a.join("B/2.mp3");
    touch(&one);
    touch(&two);

    let files = start(
        settings(),
        vec![Location::folder(&a), Location::folder(a.join("B")).ignored()],
        Collections::default(),
    );
    files.scan_sources_blocking().unwrap();
    assert_eq!(library(&files), set(&[one.clone()]));
    assert!(files.get_track(&one).unwrap().processed);

    let rx = files.subscribe();
    assert_eq!(files.toggle_source(&Location::folder(a.join("B"))).unwrap(), Some(true));
    files.scan_sources_blocking().unwrap();

    assert_eq!(library(&files), set(&[one.clone(), two.clone()]));
    let touched: Vec<PathBuf> = rx
        .try_iter()
        .filter_map(|e| match e {
            FilesEvent::SourceModified { track, .. } => Some(track.path),
            _ => None,
        })
        .collect();
    assert!(touched.contains(&two));
    assert!(!touched.contains(&one));
}

#[test]
fn second_pass_without_changes_is_quiet() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("m/a.mp3"));
    touch(&dir.path().join("m/sub/b.mp3"));

    let files = start(settings(), vec![Location::folder(dir.path().join("m"))], Collections::default());
    let rx = files.subscribe();
    files.scan_sources_blocking().unwrap();
    assert_eq!(modifications(&rx).len(), 2);

    files.scan_sources_blocking().unwrap();
    assert!(modifications(&rx).is_empty());
}

#[test]
fn ignore_rule_overrides_included_root() {
    let dir = tempdir().unwrap();
    let music = dir.path().join("music");
    let song = music.join("song.mp3");
    let demo = music.join("demos/a.mp3");
    touch(&song);
    touch(&demo);

    let files = start(
        settings(),
        vec![Location::folder(&music), Location::folder(music.join("demos")).ignored()],
        Collections::default(),
    );
    files.scan_sources_blocking().unwrap();

    assert!(files.track_is_added(&song));
    assert!(!files.track_is_added(&demo));
    assert!(files.is_path_included(&song));
    assert!(files.is_path_ignored(&demo));
    assert!(!files.is_path_included(dir.path()));
}

#[test]
fn removed_root_and_deleted_files_are_swept() {
    let dir = tempdir().unwrap();
    let keep = dir.path().join("keep/a.mp3");
    let drop_me = dir.path().join("drop/b.mp3");
    let gone = dir.path().join("keep/gone.mp3");
    touch(&keep);
    touch(&drop_me);
    touch(&gone);

    let drop_root = Location::folder(dir.path().join("drop"));
    let files = start(
        settings(),
        vec![Location::folder(dir.path().join("keep")), drop_root.clone()],
        Collections::default(),
    );
    files.scan_sources_blocking().unwrap();
    assert_eq!(library(&files).len(), 3);

    fs::remove_file(&gone).unwrap();
    files.remove_source(&drop_root).unwrap();
    files.scan_sources_blocking().unwrap();
    assert_eq!(library(&files), set(&[keep]));
}

#[test]
fn folder_rename_follows_every_collection() {
    let dir = tempdir().unwrap();
    let old = dir.path().join("old");
    let new = dir.path().join("new");
    let track = old.join("a.mp3");
    touch(&track);

    let restored = Collections {
        files: Vec::new(),
        queue: vec![Track::placeholder(&track)],
        history: vec![Track::placeholder(&track)],
        playlists: vec![Playlist {
            name: "mix".into(),
            tracks: vec![Track::placeholder(&track)],
        }],
    };
    let files = start(settings(), vec![Location::folder(dir.path())], restored);
    files.scan_sources_blocking().unwrap();

    let rx = files.subscribe();
    fs::rename(&old, &new).unwrap();
    files.dispatch(vec![JanitorTask::rename(Target::Folder, &old, &new)]);

    let moved = new.join("a.mp3");
    let c = files.collections();
    assert_eq!(c.files.iter().map(|t| &t.path).collect::<Vec<_>>(), vec![&moved]);
    assert_eq!(c.queue[0].path, moved);
    assert_eq!(c.history[0].path, moved);
    assert_eq!(c.playlists[0].tracks[0].path, moved);
    assert!(rx.try_iter().any(|e| e == FilesEvent::PathRenamed {
        old: old.clone(),
        new: new.clone()
    }));
}

#[test]
fn janitor_file_tasks_add_and_remove_single_tracks() {
    let dir = tempdir().unwrap();
    let files = start(settings(), vec![Location::folder(dir.path())], Collections::default());
    files.scan_sources_blocking().unwrap();

    let fresh = dir.path().join("fresh.mp3");
    touch(&fresh);
    files.dispatch(vec![JanitorTask::new(Action::Create, Target::File, &fresh)]);
    let track = files.get_track(&fresh).unwrap();
    assert!(track.processed);
    assert_eq!(track.artist.as_deref(), Some("Stub"));

    fs::remove_file(&fresh).unwrap();
    files.dispatch(vec![JanitorTask::new(Action::Delete, Target::File, &fresh)]);
    assert!(!files.track_is_added(&fresh));
}

#[test]
fn write_then_delete_in_one_burst_drops_the_track() {
    let dir = tempdir().unwrap();
    let song = dir.path().join("song.mp3");
    let album = dir.path().join("album");
    let track = album.join("01.mp3");
    touch(&song);
    touch(&track);
    let files = start(settings(), vec![Location::folder(dir.path())], Collections::default());
    files.scan_sources_blocking().unwrap();
    assert!(files.track_is_added(&song));

    let mut queue = TaskQueue::default();
    queue.push(JanitorTask::new(Action::Update, Target::File, &song));
    queue.push(JanitorTask::new(Action::Delete, Target::File, &song));
    assert_eq!(queue.len(), 1);
    fs::remove_file(&song).unwrap();
    files.dispatch(queue.take());
    assert!(!files.track_is_added(&song));

    // A folder moved away before its rename was handled.
    fs::remove_dir_all(&album).unwrap();
    files.dispatch(vec![JanitorTask::rename(Target::Folder, &album, dir.path().join("gone"))]);
    assert!(library(&files).is_empty());
}

#[test]
fn hidden_folders_below_a_source_stay_out() {
    let dir = tempdir().unwrap();
    let usb = dir.path().join("usb");
    let song = usb.join("song.mp3");
    let trashed = usb.join(".Trash-1000/files/old.mp3");
    touch(&song);
    touch(&trashed);

    let mut restored = Collections::default();
    restored.files.push(Track::placeholder(&trashed));
    let files = start(settings(), vec![Location::folder(&usb)], restored);
    files.scan_sources_blocking().unwrap();
    assert_eq!(library(&files), set(&[song.clone()]));

    assert_eq!(files.classify(WatchEvent::new(ChangeKind::Created, &trashed)), None);
    files.dispatch(vec![JanitorTask::new(Action::Create, Target::File, &trashed)]);
    assert!(!files.track_is_added(&trashed));

    let binned = usb.join(".Trash-1000/files/song.mp3");
    fs::rename(&song, &binned).unwrap();
    let mut moved = WatchEvent::new(ChangeKind::Renamed, &binned);
    moved.from = Some(song.clone());
    let task = files.classify(moved).unwrap();
    files.dispatch(vec![task]);
    assert!(library(&files).is_empty());

    files.scan_sources_blocking().unwrap();
    assert!(library(&files).is_empty());
}

#[test]
fn watch_events_are_classified_against_the_forest() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("music");
    fs::create_dir_all(root.join("sub")).unwrap();
    let files = start(settings(), vec![Location::folder(&root)], Collections::default());

    let created = files.classify(WatchEvent::new(ChangeKind::Created, root.join("a.mp3")));
    assert_eq!(created, Some(JanitorTask::new(Action::Create, Target::File, root.join("a.mp3"))));

    let folder = files.classify(WatchEvent::new(ChangeKind::Created, root.join("sub")));
    assert_eq!(folder, Some(JanitorTask::new(Action::Create, Target::Folder, root.join("sub"))));

    let gone_folder = files.classify(WatchEvent::new(ChangeKind::Deleted, root.join("old")));
    assert_eq!(gone_folder.map(|t| t.job.target), Some(Target::Folder));

    assert_eq!(files.classify(WatchEvent::new(ChangeKind::Changed, root.join("cover.jpg"))), None);
    assert_eq!(files.classify(WatchEvent::new(ChangeKind::Created, dir.path().join("x.mp3"))), None);
}

#[test]
fn ignore_replaces_nested_rules_and_removes_explicit_sources() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("m");
    let kept = root.join("a.mp3");
    let hidden = root.join("sub/deep/b.mp3");
    touch(&kept);
    touch(&hidden);

    let files = start(
        settings(),
        vec![Location::folder(&root), Location::folder(root.join("sub/deep")).ignored()],
        Collections::default(),
    );
    files.ignore(&root.join("sub")).unwrap();

    let sources = files.sources();
    assert_eq!(sources.len(), 2);
    assert!(files.is_path_ignored(&root.join("sub")));
    assert!(files.get_source(&root.join("sub/deep").to_string_lossy()).is_none());

    files.scan_sources_blocking().unwrap();
    assert_eq!(library(&files), set(&[kept]));

    files.ignore(&root).unwrap();
    assert!(files.get_source(&root.to_string_lossy()).is_none());
    assert!(!files.is_path_included(&root));
}

#[test]
fn remove_tracks_ignores_shortest_covering_folder() {
    let dir = tempdir().unwrap();
    let root = dir.path().join("m");
    let a1 = root.join("a/1.mp3");
    let a2 = root.join("a/x/2.mp3");
    let b3 = root.join("b/3.mp3");
    for p in [&a1, &a2, &b3] {
        touch(p);
    }

    let files = start(settings(), vec![Location::folder(&root)], Collections::default());
    files.scan_sources_blocking().unwrap();

    files.remove_tracks(&[a1.clone(), a2.clone()]).unwrap();
    assert_eq!(library(&files), set(&[b3.clone()]));
    let ignored = files.get_source(&root.join("a").to_string_lossy()).unwrap();
    assert!(ignored.ignore());

    files.scan_sources_blocking().unwrap();
    assert_eq!(library(&files), set(&[b3]));
}

#[test]
fn libraries_are_discovered_expanded_and_dropped() {
    let dir = tempdir().unwrap();
    let defs = dir.path().join("libraries");
    let folder = dir.path().join("lib");
    let song = folder.join("song.mp3");
    touch(&song);
    fs::create_dir_all(&defs).unwrap();
    fs::write(
        defs.join("Music.toml"),
        format!("kind = \"music\"\nfolders = [{:?}]\n", folder.to_string_lossy()),
    )
    .unwrap();
    fs::write(defs.join("Pictures.toml"), "kind = \"pictures\"\n").unwrap();

    let mut s = settings();
    s.libraries.dir = Some(defs.clone());
    let files = start(s, Vec::new(), Collections::default());

    files.add_system_folders().unwrap();
    let sources = files.sources();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0].kind, LocationKind::Library);
    assert!(sources[0].automatic);

    files.scan_sources_blocking().unwrap();
    assert!(files.track_is_added(&song));

    fs::remove_file(defs.join("Music.toml")).unwrap();
    files.dispatch(vec![JanitorTask::new(Action::Delete, Target::Library, defs.join("Music.toml"))]);
    assert!(files.sources().is_empty());
    files.scan_sources_blocking().unwrap();
    assert!(!files.track_is_added(&song));
}

#[test]
fn operations_after_shutdown_fail() {
    let files = start(settings(), Vec::new(), Collections::default());
    files.shutdown();
    assert!(files.scan_sources(None).is_err());
    assert!(files.add_source(Location::folder("/nowhere"), None).is_err());
}

#[test]
fn delayed_scan_runs_callbacks() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("a.mp3"));
    let files = start(settings(), vec![Location::folder(dir.path())], Collections::default());

    let (tx, rx) = mpsc::channel();
    for _ in 0..3 {
        let tx = tx.clone();
        files
            .scan_sources_with_delay(Some(Box::new(move || {
                let _ = tx.send(());
            })))
            .unwrap();
    }
    for _ in 0..3 {
        rx.recv_timeout(Duration::from_secs(10)).unwrap();
    }
    assert!(files.track_is_added(&dir.path().join("a.mp3")));
}

#[test]
fn superseded_pass_hands_its_callbacks_to_the_next() {
    let dir = tempdir().unwrap();
    let (files, gate, reached) = start_gated(settings(), dir.path());

    let (tx, rx) = mpsc::channel();
    let done = |label: &'static str| -> Option<DoneCallback> {
        let tx = tx.clone();
        Some(Box::new(move || {
            let _ = tx.send(label);
        }))
    };

    files.scan_sources(done("first")).unwrap();
    reached.recv_timeout(Duration::from_secs(5)).unwrap();
    files.scan_sources(done("second")).unwrap();
    gate.open();

    let mut fired = vec![
        rx.recv_timeout(Duration::from_secs(10)).unwrap(),
        rx.recv_timeout(Duration::from_secs(10)).unwrap(),
    ];
    fired.sort();
    assert_eq!(fired, vec!["first", "second"]);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    // The cancelled pass stopped before z.mp3; only a fresh diff finds it.
    let all: Vec<PathBuf> = ["a.mp3", "gate.mp3", "z.mp3"]
        .iter()
        .map(|n| dir.path().join(n))
        .collect();
    assert_eq!(library(&files), set(&all));
}

#[test]
fn source_change_during_a_pass_stays_visible_after_it() {
    let dir = tempdir().unwrap();
    let mut s = settings();
    s.scanner.scan_delay_ms = 60_000;
    let (files, gate, reached) = start_gated(s, dir.path());

    let (tx, rx) = mpsc::channel();
    files
        .scan_sources(Some(Box::new(move || {
            let _ = tx.send(());
        })))
        .unwrap();
    reached.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(files.toggle_source(&Location::folder(dir.path())).unwrap(), Some(false));
    gate.open();
    rx.recv_timeout(Duration::from_secs(10)).unwrap();

    let song = dir.path().join("a.mp3");
    assert!(files.is_path_ignored(&song));
    assert!(!files.is_path_included(&song));
}

#[test]
fn callback_may_start_a_pass_while_others_are_starting() {
    let dir = tempdir().unwrap();
    touch(&dir.path().join("a.mp3"));
    let files = Arc::new(start(
        settings(),
        vec![Location::folder(dir.path())],
        Collections::default(),
    ));

    let (tx, rx) = mpsc::channel();
    let nested = Arc::clone(&files);
    files
        .scan_sources(Some(Box::new(move || {
            let inner_tx = tx.clone();
            let _ = nested.scan_sources(Some(Box::new(move || {
                let _ = inner_tx.send("nested");
            })));
            let _ = tx.send("outer");
        })))
        .unwrap();
    for _ in 0..10 {
        files.scan_sources_with_delay(None).unwrap();
        thread::sleep(Duration::from_millis(5));
    }

    let mut fired = vec![
        rx.recv_timeout(Duration::from_secs(10)).unwrap(),
        rx.recv_timeout(Duration::from_secs(10)).unwrap(),
    ];
    fired.sort();
    assert_eq!(fired, vec!["nested", "outer"]);
    files.shutdown();
}

#[test]
fn blocking_scan_gives_up_when_the_service_shuts_down() {
    let dir = tempdir().unwrap();
    let (files, _gate, reached) = start_gated(settings(), dir.path());
    let files = Arc::new(files);

    let waiting = {
        let files = Arc::clone(&files);
        thread::spawn(move || files.scan_sources_blocking())
    };
    reached.recv_timeout(Duration::from_secs(5)).unwrap();
    files.shutdown();
    assert!(matches!(waiting.join().unwrap(), Err(SyncError::ShutDown)));
}

#[test]
fn forest_nesting_holds_for_every_insertion_order() {
    let paths = ["/a", "/a/b", "/a/b/c", "/a/d", "/e"];
    let mut orders = Vec::new();
    permutations(&mut paths.to_vec(), 0, &mut orders);
    assert_eq!(orders.len(), 120);

    for order in orders {
        let forest = SourceForest::from_entries(order.iter().map(|p| (*p, true)));
        let mut seen = Vec::new();
        collect_with_ancestors(&forest.trees, &mut Vec::new(), &mut seen);
        assert_eq!(seen.len(), paths.len(), "{order:?}");

        for (path, ancestors) in &seen {
            for (other, _) in &seen {
                if other != path && path.starts_with(other) {
                    assert!(ancestors.contains(other), "{order:?}: {path:?} not under {other:?}");
                }
            }
        }
    }
}

fn permutations<'a>(items: &mut Vec<&'a str>, k: usize, out: &mut Vec<Vec<&'a str>>) {
    if k == items.len() {
        out.push(items.clone());
        return;
    }
    for i in k..items.len() {
        items.swap(k, i);
        permutations(items, k + 1, out);
        items.swap(k, i);
    }
}

fn collect_with_ancestors(
    level: &[SourceTree],
    ancestors: &mut Vec<PathBuf>,
    out: &mut Vec<(PathBuf, Vec<PathBuf>)>,
) {
    for node in level {
        out.push((node.path.clone(), ancestors.clone()));
        ancestors.push(node.path.clone());
        collect_with_ancestors(&node.children, ancestors, out);
        ancestors.pop();
    }
}

#[test]
fn incremental_rescan_matches_scanning_from_scratch() {
    let dir = tempdir().unwrap();
    let t = dir.path();
    for f in ["a/1.mp3", "a/b/2.mp3", "a/b/c/3.mp3", "d/4.mp3", "5.mp3"] {
        touch(&t.join(f));
    }

    let configs: Vec<Vec<(&str, bool)>> = vec![
        vec![],
        vec![("a", true)],
        vec![("a", true), ("a/b", false)],
        vec![("a", true), ("a/b", false), ("a/b/c", true)],
        vec![("a/b", true)],
        vec![("a/b", false)],
        vec![("d", true), ("a/b/c", true)],
        vec![("", true)],
        vec![("", true), ("a", false)],
        vec![("a/b", false), ("", true)],
    ];
    let forests: Vec<SourceForest> = configs
        .iter()
        .map(|c| SourceForest::from_entries(c.iter().map(|(rel, inc)| (t.join(rel), *inc))))
        .collect();

    let scanner = PathScanner::new(Arc::new(Extensions::new(["mp3"])), true, false);
    let token = CancelToken::new();
    let from_scratch = |forest: &SourceForest| {
        let mut included = BTreeSet::new();
        for tree in &forest.trees {
            scanner.scan(&tree.path, tree, false, &token, |d| {
                included.insert(d.path);
            });
        }
        included
    };

    for old in &forests {
        for new in &forests {
            let mut included = from_scratch(old);
            for root in diff(old, new).scan_roots() {
                let node = new.subtree_for(&root);
                scanner.scan(&root, &node, true, &token, |d| match d.verdict {
                    Verdict::Include => {
                        included.insert(d.path);
                    }
                    Verdict::Exclude => {
                        included.remove(&d.path);
                    }
                });
            }
            assert_eq!(included, from_scratch(new), "{old:?} -> {new:?}");
        }
    }
}

#[test]
fn burst_of_create_and_changes_collapses_to_one_create() {
    let mut queue = TaskQueue::default();
    assert!(queue.push(JanitorTask::new(Action::Create, Target::File, "/m/x.mp3")));
    assert!(!queue.push(JanitorTask::new(Action::Update, Target::File, "/m/x.mp3")));
    assert!(!queue.push(JanitorTask::new(Action::Update, Target::File, "/m/x.mp3")));
    assert_eq!(
        queue.as_slice(),
        &[JanitorTask::new(Action::Create, Target::File, "/m/x.mp3")]
    );
}

#[test]
fn queue_promotes_and_drops_related_tasks() {
    let mut queue = TaskQueue::default();
    queue.push(JanitorTask::new(Action::Delete, Target::File, "/m/a.mp3"));
    queue.push(JanitorTask::new(Action::Update, Target::File, "/m/a.mp3"));
    assert_eq!(queue.as_slice()[0].job.action, Action::Update);

    assert!(!queue.push(JanitorTask::new(Action::Delete, Target::File, "/m/a.mp3")));
    assert_eq!(queue.len(), 1);

    queue.push(JanitorTask::new(Action::Create, Target::Folder, "/m/new"));
    assert!(!queue.push(JanitorTask::new(Action::Update, Target::File, "/m/new/b.mp3")));

    queue.push(JanitorTask::new(Action::Delete, Target::File, "/m/c.mp3"));
    queue.push(JanitorTask::new(Action::Create, Target::File, "/m/d.mp3"));
    queue.push(JanitorTask::rename(Target::File, "/m/c.mp3", "/m/d.mp3"));
    let last = queue.take();
    assert_eq!(last.len(), 3);
    assert_eq!(last[2].job.action, Action::Rename);
    assert!(queue.is_empty());
}

struct Recorder {
    tasks: mpsc::Sender<Vec<JanitorTask>>,
    scans: mpsc::Sender<usize>,
}

impl scheduler::Dispatch for Recorder {
    fn classify(&self, event: WatchEvent) -> Option<JanitorTask> {
        let action = match event.kind {
            ChangeKind::Created => Action::Create,
            ChangeKind::Deleted => Action::Delete,
            ChangeKind::Changed => Action::Update,
            ChangeKind::Renamed => return None,
        };
        Some(JanitorTask::new(action, Target::File, event.path))
    }

    fn run_tasks(&self, tasks: Vec<JanitorTask>) {
        let _ = self.tasks.send(tasks);
    }

    fn scan_now(&self, callbacks: Vec<DoneCallback>) {
        let _ = self.scans.send(callbacks.len());
        for done in callbacks {
            done();
        }
    }
}

#[test]
fn scheduler_debounces_each_stream() {
    let (tx, rx) = mpsc::channel();
    let (tasks_tx, tasks_rx) = mpsc::channel();
    let (scans_tx, scans_rx) = mpsc::channel();
    let delays = Delays {
        janitor: Duration::from_millis(50),
        scan: Duration::from_millis(50),
    };
    let handle = scheduler::spawn(
        rx,
        Recorder {
            tasks: tasks_tx,
            scans: scans_tx,
        },
        delays,
    )
    .unwrap();

    for kind in [ChangeKind::Created, ChangeKind::Changed, ChangeKind::Changed] {
        tx.send(scheduler::SchedulerMsg::Fs(WatchEvent::new(kind, "/m/x.mp3"))).unwrap();
    }
    let (done_tx, done_rx) = mpsc::channel();
    for _ in 0..2 {
        let done_tx = done_tx.clone();
        tx.send(scheduler::SchedulerMsg::ScanRequest(Some(Box::new(move || {
            let _ = done_tx.send(());
        }))))
        .unwrap();
    }

    let batch = tasks_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(batch, vec![JanitorTask::new(Action::Create, Target::File, "/m/x.mp3")]);
    assert_eq!(scans_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 2);
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    thread::sleep(Duration::from_millis(120));
    assert!(tasks_rx.try_recv().is_err());
    assert!(scans_rx.try_recv().is_err());

    tx.send(scheduler::SchedulerMsg::Shutdown).unwrap();
    handle.join().unwrap();
}
