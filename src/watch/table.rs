// src/watch/table.rs

//! Bijection between kernel watch handles and watched paths.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tracing::{debug, trace, warn};

use crate::errors::WatchError;
use crate::kernel::{kernel_mask, Kernel, WatchFlags, WatchHandle};
use crate::watch::path_utils::{is_within, normalize_path, rebase};
use crate::watch::policy::WatchPolicy;

/// Result of a successful [`WatchTable::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// A new watch was installed and recorded.
    Installed(WatchHandle),
    /// The path (or the inode behind it) already has a live watch.
    AlreadyWatched(WatchHandle),
    /// The filter vetoed the path. Not an error.
    Filtered,
}

#[derive(Debug, Clone)]
struct WatchEntry {
    path: PathBuf,
    policy: Arc<WatchPolicy>,
    mask: u32,
}

/// Watches of a directory that was renamed away, waiting for the other
/// half of the rename.
#[derive(Debug, Clone)]
pub struct DetachedSubtree {
    root: PathBuf,
    entries: Vec<(WatchHandle, WatchEntry)>,
}

impl DetachedSubtree {
    /// A subtree holding no watches.
    pub fn empty(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn handles(&self) -> impl Iterator<Item = WatchHandle> + '_ {
        self.entries.iter().map(|(handle, _)| *handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Latch shared by every table in the process, so the watch-limit warning
/// is raised once per process.
fn process_limit_latch() -> Arc<AtomicBool> {
    static LATCH: OnceLock<Arc<AtomicBool>> = OnceLock::new();
    Arc::clone(LATCH.get_or_init(|| Arc::new(AtomicBool::new(false))))
}

/// The set of active watches.
///
/// Every other component looks up or mutates watches through this type.
/// At any time each handle maps to one path and each path to one handle.
#[derive(Debug)]
pub struct WatchTable {
    by_handle: HashMap<WatchHandle, WatchEntry>,
    by_path: HashMap<PathBuf, WatchHandle>,
    limit_signaled: Arc<AtomicBool>,
}

impl Default for WatchTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchTable {
    pub fn new() -> Self {
        Self {
            by_handle: HashMap::new(),
            by_path: HashMap::new(),
            limit_signaled: process_limit_latch(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_local_limit_latch() -> Self {
        Self {
            limit_signaled: Arc::new(AtomicBool::new(false)),
            ..Self::new()
        }
    }

    /// Install a watch on `path` using `policy`.
    ///
    /// The policy's filter may veto the path or narrow its mask. `UNMOUNT`
    /// is always added to the mask. Hitting the kernel's watch ceiling
    /// yields [`WatchError::WatchLimitReached`] the first time in the
    /// process and [`WatchError::Kernel`] afterwards.
    pub fn install(
        &mut self,
        kernel: &mut dyn Kernel,
        path: &Path,
        policy: &Arc<WatchPolicy>,
    ) -> Result<InstallOutcome, WatchError> {
        let path = normalize_path(path);

        if let Some(handle) = self.by_path.get(&path) {
            return Ok(InstallOutcome::AlreadyWatched(*handle));
        }

        let mut events = policy.events;
        let mut flags = policy.flags;
        if !policy.filter.filter_watch(&path, &mut events, &mut flags) {
            debug!(path = ?path, "watch filtered out");
            return Ok(InstallOutcome::Filtered);
        }

        let mask = kernel_mask(events, flags);
        match kernel.add_watch(&path, mask) {
            Ok(handle) => {
                if let Some(existing) = self.by_handle.get(&handle) {
                    // Same inode reached through another path (bind mount, symlinked root).
                    // The call above replaced the live watch's mask; put it back.
                    debug!(
                        path = ?path,
                        existing = ?existing.path,
                        %handle,
                        "path aliases an existing watch"
                    );
                    let restore = existing.mask & !WatchFlags::MASK_ADD.bits();
                    if let Err(err) = kernel.add_watch(&path, restore) {
                        warn!(path = ?existing.path, error = %err, "failed to restore watch mask");
                    }
                    return Ok(InstallOutcome::AlreadyWatched(handle));
                }
                trace!(path = ?path, %handle, mask, "watch installed");
                self.by_path.insert(path.clone(), handle);
                self.by_handle.insert(
                    handle,
                    WatchEntry {
                        path,
                        policy: Arc::clone(policy),
                        mask,
                    },
                );
                Ok(InstallOutcome::Installed(handle))
            }
            Err(err) if err.raw_os_error() == Some(libc::ENOSPC) => {
                if !self.limit_signaled.swap(true, Ordering::SeqCst) {
                    warn!(
                        path = ?path,
                        active = self.by_handle.len(),
                        "inotify watch limit reached; raise fs.inotify.max_user_watches"
                    );
                    Err(WatchError::WatchLimitReached)
                } else {
                    debug!(path = ?path, "watch limit still reached");
                    Err(WatchError::Kernel(err))
                }
            }
            Err(err) => {
                debug!(path = ?path, error = %err, "failed to add watch");
                Err(WatchError::Kernel(err))
            }
        }
    }

    /// Forget the entry for `handle`. Unknown handles are a no-op.
    pub fn remove(&mut self, handle: WatchHandle) -> Option<PathBuf> {
        let entry = self.by_handle.remove(&handle)?;
        self.by_path.remove(&entry.path);
        Some(entry.path)
    }

    /// Remove `root` and every watch nested under it. Returns the handles removed.
    pub fn remove_subtree(&mut self, root: &Path) -> Vec<WatchHandle> {
        let root = normalize_path(root);
        let handles = self.handles_within(&root);
        for handle in &handles {
            self.remove(*handle);
        }
        handles
    }

    /// Rewrite every watch under `from` to live under `to`.
    ///
    /// The kernel watches follow the inode, only our paths change. Entries
    /// already recorded under the destination are displaced; their handles
    /// are returned so the caller can drop them from the kernel.
    pub fn rename_subtree(&mut self, from: &Path, to: &Path) -> Vec<WatchHandle> {
        let detached = self.detach_subtree(from);
        self.attach_subtree(detached, to)
    }

    /// Take `root` and everything under it out of the table, keeping the
    /// handles so they can be re-attached once the rename destination is
    /// known.
    ///
    /// Until then the handles resolve to no path, and `root` is free for a
    /// new directory created in its place.
    pub fn detach_subtree(&mut self, root: &Path) -> DetachedSubtree {
        let root = normalize_path(root);
        let mut entries: Vec<(WatchHandle, WatchEntry)> = self
            .handles_within(&root)
            .into_iter()
            .filter_map(|handle| {
                let entry = self.by_handle.remove(&handle)?;
                self.by_path.remove(&entry.path);
                Some((handle, entry))
            })
            .collect();
        entries.sort_by(|a, b| a.1.path.cmp(&b.1.path));
        trace!(root = ?root, detached = entries.len(), "watched subtree in flight");
        DetachedSubtree { root, entries }
    }

    /// Put a detached subtree back under `to`.
    ///
    /// Watches already recorded under `to` are displaced and their handles
    /// returned. A detached handle that went live again under another path
    /// in the meantime stays where it is.
    pub fn attach_subtree(&mut self, detached: DetachedSubtree, to: &Path) -> Vec<WatchHandle> {
        let to = normalize_path(to);
        let displaced = self.handles_within(&to);
        for handle in &displaced {
            self.remove(*handle);
        }

        let mut attached = 0;
        for (handle, mut entry) in detached.entries {
            if self.by_handle.contains_key(&handle) {
                continue;
            }
            let Some(new_path) = rebase(&entry.path, &detached.root, &to) else {
                continue;
            };
            entry.path = new_path.clone();
            self.by_path.insert(new_path, handle);
            self.by_handle.insert(handle, entry);
            attached += 1;
        }

        debug!(from = ?detached.root, to = ?to, attached, "renamed watched subtree");
        displaced
    }

    /// Handles of `detached` the table does not currently hold.
    pub fn orphaned_handles(&self, detached: &DetachedSubtree) -> Vec<WatchHandle> {
        detached
            .handles()
            .filter(|handle| !self.by_handle.contains_key(handle))
            .collect()
    }

    pub fn path_for(&self, handle: WatchHandle) -> Option<&Path> {
        self.by_handle.get(&handle).map(|e| e.path.as_path())
    }

    pub fn policy_for(&self, handle: WatchHandle) -> Option<&Arc<WatchPolicy>> {
        self.by_handle.get(&handle).map(|e| &e.policy)
    }

    pub fn handle_for(&self, path: &Path) -> Option<WatchHandle> {
        self.by_path.get(&normalize_path(path)).copied()
    }

    /// Whether some live watch has exactly this (normalized) path.
    pub fn is_watching(&self, path: &Path) -> bool {
        self.by_path.contains_key(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// All watched paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.by_path.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Both directions agree and have the same size.
    pub fn is_consistent(&self) -> bool {
        self.by_handle.len() == self.by_path.len()
            && self
                .by_handle
                .iter()
                .all(|(handle, entry)| self.by_path.get(&entry.path) == Some(handle))
    }

    fn handles_within(&self, root: &Path) -> Vec<WatchHandle> {
        self.by_handle
            .iter()
            .filter(|(_, entry)| is_within(&entry.path, root))
            .map(|(handle, _)| *handle)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::fake::FakeKernel;
    use crate::kernel::EventMask;
    use crate::watch::filter::WatchFilter;

    fn policy() -> Arc<WatchPolicy> {
        Arc::new(WatchPolicy::new(EventMask::CREATE | EventMask::DELETE))
    }

    #[test]
    fn install_records_normalized_path_and_adds_unmount() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();

        let outcome = table.install(&mut kernel, Path::new("/w/a/"), &policy()).unwrap();
        let InstallOutcome::Installed(handle) = outcome else {
            panic!("expected a new watch, got {outcome:?}");
        };

        assert_eq!(table.path_for(handle), Some(Path::new("/w/a")));
        assert!(table.is_watching(Path::new("/w/a")));
        assert!(table.is_watching(Path::new("/w/a/")));
        let mask = kernel.mask_for("/w/a").unwrap();
        assert_ne!(mask & EventMask::UNMOUNT.bits(), 0);
        assert_ne!(mask & EventMask::CREATE.bits(), 0);
    }

    #[test]
    fn second_install_of_same_path_reuses_the_handle() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        let p = policy();

        let first = table.install(&mut kernel, Path::new("/w"), &p).unwrap();
        let second = table.install(&mut kernel, Path::new("/w"), &p).unwrap();

        let InstallOutcome::Installed(handle) = first else { panic!() };
        assert_eq!(second, InstallOutcome::AlreadyWatched(handle));
        assert_eq!(table.len(), 1);
        assert_eq!(kernel.add_watch_calls(), 1);
    }

    #[derive(Debug)]
    struct NarrowingFilter;

    impl WatchFilter for NarrowingFilter {
        fn filter_watch(&self, path: &Path, events: &mut EventMask, flags: &mut WatchFlags) -> bool {
            events.remove(EventMask::DELETE);
            flags.insert(WatchFlags::ONLY_DIR);
            !path.ends_with("skip")
        }
    }

    #[test]
    fn filter_can_veto_or_narrow() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        let p = Arc::new(
            WatchPolicy::new(EventMask::CREATE | EventMask::DELETE)
                .with_filter(Arc::new(NarrowingFilter)),
        );

        let vetoed = table.install(&mut kernel, Path::new("/w/skip"), &p).unwrap();
        assert_eq!(vetoed, InstallOutcome::Filtered);
        assert_eq!(kernel.add_watch_calls(), 0);

        table.install(&mut kernel, Path::new("/w/keep"), &p).unwrap();
        let mask = kernel.mask_for("/w/keep").unwrap();
        assert_eq!(mask & EventMask::DELETE.bits(), 0);
        assert_ne!(mask & WatchFlags::ONLY_DIR.bits(), 0);
    }

    #[test]
    fn watch_limit_is_signaled_once_per_latch() {
        let mut kernel = FakeKernel::new().with_watch_limit(1);
        let mut table = WatchTable::with_local_limit_latch();
        let p = policy();

        table.install(&mut kernel, Path::new("/a"), &p).unwrap();
        let first = table.install(&mut kernel, Path::new("/b"), &p).unwrap_err();
        let second = table.install(&mut kernel, Path::new("/c"), &p).unwrap_err();

        assert!(matches!(first, WatchError::WatchLimitReached));
        assert!(matches!(second, WatchError::Kernel(ref e) if e.raw_os_error() == Some(libc::ENOSPC)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn other_kernel_errors_are_returned_as_is() {
        let mut kernel = FakeKernel::new();
        kernel.fail_path("/gone", libc::ENOENT);
        let mut table = WatchTable::with_local_limit_latch();

        let err = table.install(&mut kernel, Path::new("/gone"), &policy()).unwrap_err();
        assert!(matches!(err, WatchError::Kernel(ref e) if e.raw_os_error() == Some(libc::ENOENT)));
        assert!(table.is_empty());
    }

    #[test]
    fn remove_is_idempotent() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        let p = policy();
        table.install(&mut kernel, Path::new("/a"), &p).unwrap();
        let b = match table.install(&mut kernel, Path::new("/b"), &p).unwrap() {
            InstallOutcome::Installed(h) => h,
            other => panic!("unexpected {other:?}"),
        };

        assert_eq!(table.remove(b), Some(PathBuf::from("/b")));
        assert_eq!(table.remove(b), None);
        assert_eq!(table.remove(WatchHandle::from_raw(999)), None);
        assert!(table.is_watching(Path::new("/a")));
        assert!(table.is_consistent());
    }

    #[test]
    fn remove_subtree_is_component_wise() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        let p = policy();
        for path in ["/w/a", "/w/a/b", "/w/a/b/c", "/w/ab"] {
            table.install(&mut kernel, Path::new(path), &p).unwrap();
        }

        let removed = table.remove_subtree(Path::new("/w/a"));
        assert_eq!(removed.len(), 3);
        assert_eq!(table.paths(), vec![PathBuf::from("/w/ab")]);
    }

    #[test]
    fn rename_subtree_keeps_handles() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        let p = policy();
        table.install(&mut kernel, Path::new("/w/a"), &p).unwrap();
        table.install(&mut kernel, Path::new("/w/a/b"), &p).unwrap();
        let a = table.handle_for(Path::new("/w/a")).unwrap();

        let displaced = table.rename_subtree(Path::new("/w/a"), Path::new("/w/z"));

        assert!(displaced.is_empty());
        assert_eq!(table.paths(), vec![PathBuf::from("/w/z"), PathBuf::from("/w/z/b")]);
        assert_eq!(table.handle_for(Path::new("/w/z")), Some(a));
        assert!(table.is_consistent());
    }

    #[test]
    fn rename_over_existing_watch_displaces_it() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        let p = policy();
        table.install(&mut kernel, Path::new("/w/a"), &p).unwrap();
        table.install(&mut kernel, Path::new("/w/z"), &p).unwrap();
        let old_z = table.handle_for(Path::new("/w/z")).unwrap();

        let displaced = table.rename_subtree(Path::new("/w/a"), Path::new("/w/z"));

        assert_eq!(displaced, vec![old_z]);
        assert_eq!(table.len(), 1);
        assert!(table.is_consistent());
    }

    #[test]
    fn aliased_install_keeps_the_live_watch_mask() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        table.install(&mut kernel, Path::new("/w/a"), &policy()).unwrap();
        let handle = table.handle_for(Path::new("/w/a")).unwrap();
        let original = kernel.mask_for("/w/a").unwrap();

        // The table now knows the inode as /w/z; the fake kernel still
        // resolves /w/a to it, like a second path to the same directory.
        table.rename_subtree(Path::new("/w/a"), Path::new("/w/z"));
        let other = Arc::new(WatchPolicy::new(EventMask::MODIFY));
        let outcome = table.install(&mut kernel, Path::new("/w/a"), &other).unwrap();

        assert_eq!(outcome, InstallOutcome::AlreadyWatched(handle));
        assert_eq!(kernel.mask_for("/w/a"), Some(original));
        assert_eq!(table.paths(), vec![PathBuf::from("/w/z")]);
    }

    #[test]
    fn detached_subtree_frees_its_paths() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        let p = policy();
        for path in ["/w", "/w/a", "/w/a/b"] {
            table.install(&mut kernel, Path::new(path), &p).unwrap();
        }
        let a = table.handle_for(Path::new("/w/a")).unwrap();

        let detached = table.detach_subtree(Path::new("/w/a"));

        assert_eq!(detached.len(), 2);
        assert_eq!(detached.root(), Path::new("/w/a"));
        assert_eq!(table.paths(), vec![PathBuf::from("/w")]);
        assert_eq!(table.path_for(a), None);
        assert!(table.is_consistent());
        assert_eq!(table.orphaned_handles(&detached).len(), 2);
    }

    #[test]
    fn attach_skips_handles_that_went_live_again() {
        let mut kernel = FakeKernel::new();
        let mut table = WatchTable::with_local_limit_latch();
        let p = policy();
        table.install(&mut kernel, Path::new("/w/a"), &p).unwrap();
        table.install(&mut kernel, Path::new("/w/a/b"), &p).unwrap();
        let a = table.handle_for(Path::new("/w/a")).unwrap();

        let detached = table.detach_subtree(Path::new("/w/a"));
        // The fake kernel hands the same handle back for the same path.
        assert_eq!(
            table.install(&mut kernel, Path::new("/w/a"), &p).unwrap(),
            InstallOutcome::Installed(a)
        );
        assert_eq!(table.orphaned_handles(&detached).len(), 1);

        let displaced = table.attach_subtree(detached, Path::new("/w/z"));

        assert!(displaced.is_empty());
        assert_eq!(table.paths(), vec![PathBuf::from("/w/a"), PathBuf::from("/w/z/b")]);
        assert_eq!(table.handle_for(Path::new("/w/a")), Some(a));
        assert!(table.is_consistent());
    }
}
