use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::warn;
use walkdir::WalkDir;

use crate::library::FormatSupport;
use crate::paths::is_hidden;

use super::forest::SourceTree;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Verdict {
    Include,
    Exclude,
}

/// What the scanner decided for one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanDecision {
    pub path: PathBuf,
    pub verdict: Verdict,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    Completed,
    Cancelled,
}

/// Cooperative cancellation flag.
///
/// A token made with [`CancelToken::child`] also reports cancelled once its
/// parent is.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Arc::clone(&self.flag)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|p| p.load(Ordering::SeqCst))
    }
}

/// Walks a path against a [`SourceTree`] and decides, per audio file, whether
/// it belongs in the collection.
pub struct PathScanner {
    formats: Arc<dyn FormatSupport>,
    follow_links: bool,
    include_hidden: bool,
}

impl PathScanner {
    pub fn new(formats: Arc<dyn FormatSupport>, follow_links: bool, include_hidden: bool) -> Self {
        Self {
            formats,
            follow_links,
            include_hidden,
        }
    }

    /// Scan `root` with `node` as its governing tree.
    ///
    /// Files inside directories are only considered when their format is
    /// supported; a file given as `root` is excluded when it is not.
    /// `Exclude` decisions are only emitted with `remove_ignored`.
    /// Directories are visited files first, then subdirectories, so a
    /// directory's policy is settled before anything below it.
    pub fn scan<F>(
        &self,
        root: &Path,
        node: &SourceTree,
        remove_ignored: bool,
        token: &CancelToken,
        mut sink: F,
    ) -> ScanOutcome
    where
        F: FnMut(ScanDecision),
    {
        let mut emit = |path: &Path, include: bool| {
            if include || remove_ignored {
                sink(ScanDecision {
                    path: path.to_path_buf(),
                    verdict: if include { Verdict::Include } else { Verdict::Exclude },
                });
            }
        };

        let walker = WalkDir::new(root)
            .follow_links(self.follow_links)
            .sort_by(|a, b| {
                a.file_type()
                    .is_dir()
                    .cmp(&b.file_type().is_dir())
                    .then_with(|| a.file_name().cmp(b.file_name()))
            });

        // stack[d] governs the directory entered at depth d.
        let mut stack: Vec<&SourceTree> = Vec::new();

        for entry in walker
            .into_iter()
            .filter_entry(|e| self.include_hidden || e.depth() == 0 || !is_hidden(e.path()))
        {
            if token.is_cancelled() {
                return ScanOutcome::Cancelled;
            }

            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    let path = e.path().map(|p| p.display().to_string()).unwrap_or_default();
                    warn!("Skipping unreadable path {}: {}", path, e);
                    continue;
                }
            };

            let path = entry.path();
            let depth = entry.depth();

            if depth == 0 {
                let governing = node.governing(path);
                if entry.file_type().is_dir() {
                    stack.push(governing);
                } else {
                    emit(path, governing.include && self.formats.is_supported(path));
                }
                continue;
            }

            stack.truncate(depth);
            let Some(&parent) = stack.last() else {
                continue;
            };
            let governing = parent.child(path).unwrap_or(parent);

            if entry.file_type().is_dir() {
                stack.push(governing);
            } else if self.formats.is_supported(path) {
                emit(path, governing.include);
            }
        }

        ScanOutcome::Completed
    }
}
