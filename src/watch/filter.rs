// src/watch/filter.rs

//! Pluggable policy deciding which directories get a watch.

use std::ffi::OsStr;
use std::fmt;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::kernel::{EventMask, WatchFlags};

/// Mount points whose contents are generated by the kernel and never worth
/// watching.
pub const PSEUDO_FILESYSTEMS: &[&str] = &["/proc", "/sys", "/dev"];

/// Hook consulted before every install and during recursive descent.
pub trait WatchFilter: Send + Sync + fmt::Debug {
    /// Decide whether `path` gets a watch at all.
    ///
    /// Implementations may narrow `events` or adjust `flags` in place.
    /// Returning `false` skips the path; that is not an error.
    fn filter_watch(&self, path: &Path, events: &mut EventMask, flags: &mut WatchFlags) -> bool;

    /// Decide whether the child directory `name` of `parent` is descended into.
    fn should_recurse(&self, parent: &Path, name: &OsStr, include_hidden: bool) -> bool {
        let _ = parent;
        is_traversable_name(name, include_hidden)
    }
}

/// `.` and `..` are never followed; hidden names only with `include_hidden`.
pub fn is_traversable_name(name: &OsStr, include_hidden: bool) -> bool {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes == b"." || bytes == b".." {
        return false;
    }
    include_hidden || bytes[0] != b'.'
}

/// Whether `path` is, or lives under, one of [`PSEUDO_FILESYSTEMS`].
pub fn is_pseudo_filesystem(path: &Path) -> bool {
    PSEUDO_FILESYSTEMS
        .iter()
        .any(|root| path.starts_with(root))
}

/// Filter used when the caller does not supply one.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFilter;

impl WatchFilter for DefaultFilter {
    fn filter_watch(&self, path: &Path, _events: &mut EventMask, _flags: &mut WatchFlags) -> bool {
        !is_pseudo_filesystem(path)
    }
}

/// [`DefaultFilter`] plus a set of glob patterns excluding directories.
///
/// Patterns are matched against absolute paths, so they usually start with
/// `**/`, e.g. `"**/node_modules"` or `"**/target"`.
#[derive(Clone)]
pub struct GlobFilter {
    patterns: Vec<String>,
    exclude_set: GlobSet,
}

impl fmt::Debug for GlobFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobFilter")
            .field("patterns", &self.patterns)
            .finish_non_exhaustive()
    }
}

impl GlobFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let exclude_set = build_globset(patterns)?;
        Ok(Self {
            patterns: patterns.to_vec(),
            exclude_set,
        })
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_excluded(&self, path: &Path) -> bool {
        self.exclude_set.is_match(path)
    }
}

impl WatchFilter for GlobFilter {
    fn filter_watch(&self, path: &Path, events: &mut EventMask, flags: &mut WatchFlags) -> bool {
        DefaultFilter.filter_watch(path, events, flags) && !self.is_excluded(path)
    }

    fn should_recurse(&self, parent: &Path, name: &OsStr, include_hidden: bool) -> bool {
        is_traversable_name(name, include_hidden) && !self.is_excluded(&parent.join(name))
    }
}

/// Build a GlobSet from simple string patterns.
fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}
