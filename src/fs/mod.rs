// src/fs/mod.rs

use std::ffi::OsString;
use std::fmt::Debug;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::warn;

pub mod mock;

/// What a directory listing says about an entry.
///
/// `Unknown` means the type could not be determined at listing time,
/// usually because the entry vanished; the caller may check it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    Other,
    Unknown,
}

/// One entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: OsString,
    pub kind: EntryKind,
}

impl DirEntryInfo {
    pub fn new(name: impl Into<OsString>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Abstract filesystem interface used while descending a tree.
pub trait FileSystem: Send + Sync + Debug {
    /// List the entries of a directory, without `.` and `..`.
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>>;

    /// Whether `path` is a directory. Symlinks are not followed.
    fn is_dir_nofollow(&self, path: &Path) -> bool;
}

/// Implementation that uses `std::fs`.
#[derive(Debug, Clone, Default)]
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let entries = fs::read_dir(path).with_context(|| format!("reading dir {:?}", path))?;
        Ok(keep_readable(
            path,
            entries.map(|entry| {
                entry.map(|entry| {
                    // Does not follow symlinks; std falls back to lstat when
                    // the dirent carries no type.
                    let kind = match entry.file_type() {
                        Ok(ft) if ft.is_dir() => EntryKind::Dir,
                        Ok(_) => EntryKind::Other,
                        Err(_) => EntryKind::Unknown,
                    };
                    DirEntryInfo::new(entry.file_name(), kind)
                })
            }),
        ))
    }

    fn is_dir_nofollow(&self, path: &Path) -> bool {
        fs::symlink_metadata(path)
            .map(|meta| meta.file_type().is_dir())
            .unwrap_or(false)
    }
}

/// Drop entries that failed to read, keeping their siblings.
fn keep_readable(
    dir: &Path,
    entries: impl Iterator<Item = io::Result<DirEntryInfo>>,
) -> Vec<DirEntryInfo> {
    entries
        .filter_map(|entry| match entry {
            Ok(info) => Some(info),
            Err(err) => {
                warn!(dir = ?dir, error = %err, "skipping unreadable directory entry");
                None
            }
        })
        .collect()
}
