use std::path::{Path, PathBuf};

use tracing::warn;

use crate::paths::{full_path, is_descendant};

use super::libraries::LibraryResolver;
use super::location::{Location, LocationKind};

/// One node of a [`SourceForest`].
///
/// Every child lies strictly below its parent. `include` is this subtree's
/// policy and is overridden by any more specific child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub path: PathBuf,
    pub include: bool,
    pub children: Vec<SourceTree>,
}

impl SourceTree {
    pub fn new(path: impl Into<PathBuf>, include: bool) -> Self {
        Self {
            path: path.into(),
            include,
            children: Vec::new(),
        }
    }

    /// The child whose path is exactly `path`.
    pub fn child(&self, path: &Path) -> Option<&SourceTree> {
        self.children.iter().find(|c| c.path == path)
    }

    /// Deepest node of this subtree that is `path` or one of its ancestors.
    pub fn governing(&self, path: &Path) -> &SourceTree {
        let mut node = self;
        while let Some(next) = node.children.iter().find(|c| path.starts_with(&c.path)) {
            node = next;
        }
        node
    }

    /// Whether any node of this subtree is included.
    pub fn has_included(&self) -> bool {
        self.include || self.children.iter().any(SourceTree::has_included)
    }
}

/// The nesting-resolved view of every configured [`Location`].
///
/// Built once per reconciliation pass and never mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceForest {
    pub trees: Vec<SourceTree>,
}

impl SourceForest {
    /// Build a forest from `locations`, expanding libraries through `libraries`.
    ///
    /// A library that cannot be expanded is logged and left out of this
    /// forest only.
    pub fn build(locations: &[Location], libraries: &dyn LibraryResolver) -> Self {
        let mut forest = Self::default();
        for loc in locations {
            match loc.kind {
                LocationKind::File | LocationKind::Folder => {
                    if let Some(path) = loc.path() {
                        forest.insert(SourceTree::new(path, loc.include));
                    }
                }
                LocationKind::Library => match libraries.expand(&loc.data) {
                    Ok(folders) => {
                        for folder in folders {
                            forest.insert(SourceTree::new(full_path(&folder), loc.include));
                        }
                    }
                    Err(e) => warn!("Skipping library {}: {}", loc.data, e),
                },
            }
        }
        forest
    }

    /// Forest from bare `(path, include)` pairs, in order.
    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, bool)>,
        P: AsRef<Path>,
    {
        let mut forest = Self::default();
        for (path, include) in entries {
            forest.insert(SourceTree::new(full_path(path.as_ref()), include));
        }
        forest
    }

    /// Insert `node` keeping the nesting invariant. Duplicate paths keep the
    /// node inserted first.
    pub fn insert(&mut self, node: SourceTree) {
        insert_into(&mut self.trees, node);
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Deepest node whose path is `path` or an ancestor of it.
    pub fn closest(&self, path: &Path) -> Option<&SourceTree> {
        self.top_level_of(path).map(|top| top.governing(path))
    }

    /// The outermost tree containing `path`.
    pub fn top_level_of(&self, path: &Path) -> Option<&SourceTree> {
        self.trees.iter().find(|t| path.starts_with(&t.path))
    }

    pub fn find_exact(&self, path: &Path) -> Option<&SourceTree> {
        self.closest(path).filter(|t| t.path == path)
    }

    /// Whether `path` is covered by an included node.
    pub fn path_is_added(&self, path: &Path) -> bool {
        self.closest(path).is_some_and(|t| t.include)
    }

    /// Whether `path` is covered by an ignore node.
    pub fn path_is_ignored(&self, path: &Path) -> bool {
        self.closest(path).is_some_and(|t| !t.include)
    }

    /// A tree rooted exactly at `path` carrying the policy this forest
    /// applies there.
    ///
    /// When no node sits at `path`, the result takes its policy from the
    /// closest ancestor (or ignores, when nothing covers `path`) and adopts
    /// every node below `path`.
    pub fn subtree_for(&self, path: &Path) -> SourceTree {
        let (include, candidates) = match self.closest(path) {
            Some(node) if node.path == path => return node.clone(),
            Some(node) => (node.include, &node.children),
            None => (false, &self.trees),
        };
        SourceTree {
            path: path.to_path_buf(),
            include,
            children: candidates
                .iter()
                .filter(|c| is_descendant(&c.path, path))
                .cloned()
                .collect(),
        }
    }
}

fn insert_into(level: &mut Vec<SourceTree>, mut node: SourceTree) {
    for idx in 0..level.len() {
        let existing = &level[idx].path;
        if *existing == node.path {
            warn!("Duplicate source path {}; keeping the first", node.path.display());
            return;
        }
        if is_descendant(&node.path, existing) {
            insert_into(&mut level[idx].children, node);
            return;
        }
        if is_descendant(existing, &node.path) {
            // `node` takes this slot and adopts every sibling below it.
            let siblings = std::mem::take(level);
            let mut slot = None;
            for tree in siblings {
                if is_descendant(&tree.path, &node.path) {
                    slot.get_or_insert(level.len());
                    node.children.push(tree);
                } else {
                    level.push(tree);
                }
            }
            level.insert(slot.unwrap_or(level.len()), node);
            return;
        }
    }
    level.push(node);
}
