//! Path helpers used by the forest, the scanner and the janitor.
//!
//! All path relationships are component-wise (`/music2` is not inside
//! `/music`), and every path stored by the crate goes through [`full_path`]
//! first so that comparisons are plain equality.

use std::env;
use std::path::{Component, Path, PathBuf};

/// Absolute, lexically normalised form of `path`.
///
/// `.` components are dropped and `..` pops the previous component. Symlinks
/// are not resolved, so the result is stable for paths that no longer exist.
pub fn full_path(path: &Path) -> PathBuf {
    let abs = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut out = PathBuf::new();
    for comp in abs.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// `true` when `path` lies strictly below `ancestor`.
pub fn is_descendant(path: &Path, ancestor: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}

/// Rewrite the `from` prefix of `path` into `to`.
///
/// Returns `None` when `path` is not `from` or below it.
pub fn replace_prefix(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(from).ok()?;
    if rest.as_os_str().is_empty() {
        Some(to.to_path_buf())
    } else {
        Some(to.join(rest))
    }
}

/// The key under which a change subscription for `path` is registered.
///
/// On Windows one watcher covers a whole drive. Elsewhere the subscription is
/// per top-level source root, so `top` (the outermost source containing
/// `path`) is the key.
#[cfg(windows)]
pub fn watch_key(path: &Path, _top: &Path) -> PathBuf {
    path.components()
        .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
        .collect()
}

#[cfg(not(windows))]
pub fn watch_key(_path: &Path, top: &Path) -> PathBuf {
    top.to_path_buf()
}

/// Whether the final component is a dotfile / dot-directory.
pub fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|s| s.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

/// Whether any component of `path` below `root` is hidden. `root` itself is
/// not checked.
pub fn hidden_below(path: &Path, root: &Path) -> bool {
    path.strip_prefix(root).is_ok_and(|rest| {
        rest.components()
            .any(|c| matches!(c, Component::Normal(name) if name.to_string_lossy().starts_with('.')))
    })
}

/// The user's music folder: `$XDG_MUSIC_DIR`, falling back to `~/Music`.
pub fn user_music_dir() -> Option<PathBuf> {
    if let Some(p) = env::var_os("XDG_MUSIC_DIR") {
        return Some(PathBuf::from(p));
    }
    env::var_os("HOME").map(|home| PathBuf::from(home).join("Music"))
}
