// src/watch/path_utils.rs

//! Utility functions for path handling in the watcher.

use std::path::{Path, PathBuf};

/// Normalize a path before it is stored or looked up.
///
/// - Relative paths are made absolute against the current directory.
/// - Trailing separators, repeated separators and `.` components are
///   dropped, so `/w/a/`, `/w//a` and `/w/./a` all become `/w/a`.
///
/// This is purely lexical: symlinks are not resolved and `..` is kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    };
    absolute.components().collect()
}

/// Whether `path` is `root` itself or lies underneath it.
///
/// Compared component-wise, so `/w/ab` is not nested under `/w/a`.
pub fn is_within(path: &Path, root: &Path) -> bool {
    path.starts_with(root)
}

/// Re-root `path` from under `from` to under `to`.
///
/// Returns `None` when `path` is not within `from`.
pub fn rebase(path: &Path, from: &Path, to: &Path) -> Option<PathBuf> {
    let rest = path.strip_prefix(from).ok()?;
    if rest.as_os_str().is_empty() {
        Some(to.to_path_buf())
    } else {
        Some(to.join(rest))
    }
}
