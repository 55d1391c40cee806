use std::path::PathBuf;

use crate::paths::is_descendant;

use super::forest::{SourceForest, SourceTree};

/// Subtrees whose effective policy differs between two forests.
///
/// `added` subtrees may now contribute tracks; `removed` ones may now have to
/// evict tracks. Either way the subtree must be rescanned against the new
/// forest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForestDiff {
    pub added: Vec<SourceTree>,
    pub removed: Vec<SourceTree>,
}

impl ForestDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// The smallest set of paths covering every changed subtree, removed
    /// subtrees first.
    pub fn scan_roots(&self) -> Vec<PathBuf> {
        covering_roots(self.removed.iter().chain(&self.added).map(|t| t.path.clone()))
    }
}

/// Drop every path that repeats or lies below another one, keeping order.
pub fn covering_roots(paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
    let all: Vec<PathBuf> = paths.into_iter().collect();
    let mut roots: Vec<PathBuf> = Vec::new();
    for path in &all {
        let covered = all.iter().any(|other| is_descendant(path, other));
        if !covered && !roots.contains(path) {
            roots.push(path.clone());
        }
    }
    roots
}

/// Compare two forests level by level, pairing nodes by exact path.
pub fn diff(old: &SourceForest, new: &SourceForest) -> ForestDiff {
    let mut out = ForestDiff::default();
    diff_level(&old.trees, &new.trees, &mut out);
    out
}

fn diff_level(old: &[SourceTree], new: &[SourceTree], out: &mut ForestDiff) {
    for before in old {
        match new.iter().find(|n| n.path == before.path) {
            Some(after) => {
                if before.include != after.include {
                    if after.include {
                        out.added.push(after.clone());
                    } else {
                        out.removed.push(after.clone());
                    }
                }
                diff_level(&before.children, &after.children, out);
            }
            // An ignore rule going away makes its area eligible again.
            None if before.include => out.removed.push(before.clone()),
            None => out.added.push(before.clone()),
        }
    }

    for after in new {
        if old.iter().any(|o| o.path == after.path) {
            continue;
        }
        if after.include {
            out.added.push(after.clone());
        } else {
            out.removed.push(after.clone());
        }
    }
}
