// src/fs/mock.rs

use super::{DirEntryInfo, EntryKind, FileSystem};
use anyhow::{anyhow, Result};
use std::collections::{BTreeSet, HashMap};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone)]
pub enum MockEntry {
    File,
    Dir(BTreeSet<OsString>), // Child names, sorted so listings are stable
}

#[derive(Debug, Default)]
struct MockState {
    entries: HashMap<PathBuf, MockEntry>,
    unknown_kinds: bool,
    unreadable: BTreeSet<PathBuf>,
}

/// In-memory tree. Clones share state so tests can mutate the tree after
/// handing it to the watcher.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    state: Arc<Mutex<MockState>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        let fs = Self::default();
        fs.add_dir("/");
        fs
    }

    /// Report every listed entry as [`EntryKind::Unknown`], as some
    /// filesystems do, forcing callers to fall back to `is_dir_nofollow`.
    pub fn with_unknown_kinds(self) -> Self {
        self.lock().unknown_kinds = true;
        self
    }

    /// Add a directory, creating missing parents.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut state = self.lock();
        ensure_dir(&mut state.entries, path.as_ref());
    }

    /// Add a regular file, creating missing parents.
    pub fn add_file(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.lock();
        if let Some(parent) = path.parent() {
            ensure_dir(&mut state.entries, parent);
            link_child(&mut state.entries, parent, path);
        }
        state.entries.insert(path.to_path_buf(), MockEntry::File);
    }

    /// Remove `path` and everything below it.
    pub fn remove(&self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        let mut state = self.lock();
        state.entries.retain(|p, _| !p.starts_with(path));
        if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
            if let Some(MockEntry::Dir(children)) = state.entries.get_mut(parent) {
                children.remove(name);
            }
        }
    }

    /// Make `read_dir` on `path` fail, as for a directory we may not open.
    pub fn make_unreadable(&self, path: impl AsRef<Path>) {
        self.lock().unreadable.insert(path.as_ref().to_path_buf());
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn ensure_dir(entries: &mut HashMap<PathBuf, MockEntry>, path: &Path) {
    if matches!(entries.get(path), Some(MockEntry::Dir(_))) {
        return;
    }
    entries.insert(path.to_path_buf(), MockEntry::Dir(BTreeSet::new()));
    if let Some(parent) = path.parent() {
        ensure_dir(entries, parent);
        link_child(entries, parent, path);
    }
}

fn link_child(entries: &mut HashMap<PathBuf, MockEntry>, parent: &Path, child: &Path) {
    if let (Some(MockEntry::Dir(children)), Some(name)) =
        (entries.get_mut(parent), child.file_name())
    {
        children.insert(name.to_os_string());
    }
}

impl FileSystem for MockFileSystem {
    fn read_dir(&self, path: &Path) -> Result<Vec<DirEntryInfo>> {
        let state = self.lock();
        if state.unreadable.contains(path) {
            return Err(anyhow!("Permission denied: {:?}", path));
        }
        match state.entries.get(path) {
            Some(MockEntry::Dir(children)) => Ok(children
                .iter()
                .map(|name| {
                    let kind = if state.unknown_kinds {
                        EntryKind::Unknown
                    } else {
                        match state.entries.get(&path.join(name)) {
                            Some(MockEntry::Dir(_)) => EntryKind::Dir,
                            _ => EntryKind::Other,
                        }
                    };
                    DirEntryInfo::new(name.clone(), kind)
                })
                .collect()),
            _ => Err(anyhow!("Not a directory or not found: {:?}", path)),
        }
    }

    fn is_dir_nofollow(&self, path: &Path) -> bool {
        matches!(self.lock().entries.get(path), Some(MockEntry::Dir(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_are_created_implicitly() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/a/b/file.txt");

        assert!(fs.is_dir_nofollow(Path::new("/w/a/b")));
        assert!(!fs.is_dir_nofollow(Path::new("/w/a/b/file.txt")));
        let entries = fs.read_dir(Path::new("/w/a")).unwrap();
        assert_eq!(entries, vec![DirEntryInfo::new("b", EntryKind::Dir)]);
    }

    #[test]
    fn unknown_kinds_and_removal() {
        let fs = MockFileSystem::new().with_unknown_kinds();
        fs.add_dir("/w/a");
        fs.add_dir("/w/b");

        let entries = fs.read_dir(Path::new("/w")).unwrap();
        assert!(entries.iter().all(|e| e.kind == EntryKind::Unknown));

        fs.remove("/w/a");
        assert!(!fs.is_dir_nofollow(Path::new("/w/a")));
        assert_eq!(fs.read_dir(Path::new("/w")).unwrap().len(), 1);
    }

    #[test]
    fn unreadable_directories_fail_to_list() {
        let fs = MockFileSystem::new();
        fs.add_dir("/w/locked");
        fs.make_unreadable("/w/locked");
        assert!(fs.read_dir(Path::new("/w/locked")).is_err());
    }
}
