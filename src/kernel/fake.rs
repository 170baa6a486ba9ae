// src/kernel/fake.rs

//! In-memory kernel used by tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use super::{EventMask, Kernel, KernelVersion, WatchFlags, WatchHandle};
use crate::watch::decoder::RawEvent;

#[derive(Debug, Clone, Copy)]
struct FakeWatch {
    handle: WatchHandle,
    mask: u32,
}

#[derive(Debug)]
struct FakeState {
    next_wd: i32,
    watches: HashMap<PathBuf, FakeWatch>,
    limit: Option<usize>,
    failures: HashMap<PathBuf, i32>,
    records: VecDeque<Vec<u8>>,
    version: KernelVersion,
    add_calls: usize,
    removed: Vec<WatchHandle>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            next_wd: 1,
            watches: HashMap::new(),
            limit: None,
            failures: HashMap::new(),
            records: VecDeque::new(),
            version: KernelVersion::new(6, 1, 0),
            add_calls: 0,
            removed: Vec::new(),
        }
    }
}

/// Fake inotify instance.
///
/// Clones share state, so a test can keep one clone to inject events and
/// inspect watches after handing another to the facade.
#[derive(Debug, Clone, Default)]
pub struct FakeKernel {
    state: Arc<Mutex<FakeState>>,
}

impl FakeKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail installs with `ENOSPC` once `limit` watches are active.
    pub fn with_watch_limit(self, limit: usize) -> Self {
        self.state().limit = Some(limit);
        self
    }

    pub fn with_version(self, version: KernelVersion) -> Self {
        self.state().version = version;
        self
    }

    /// Make every install on `path` fail with `errno`.
    pub fn fail_path(&self, path: impl AsRef<Path>, errno: i32) {
        self.state()
            .failures
            .insert(path.as_ref().to_path_buf(), errno);
    }

    /// Queue one record for the next `read_raw`.
    pub fn push_event(&self, event: RawEvent) {
        let mut record = Vec::new();
        event.encode_into(&mut record);
        self.state().records.push_back(record);
    }

    /// Convenience wrapper around [`FakeKernel::push_event`].
    pub fn emit(&self, handle: WatchHandle, mask: EventMask, cookie: u32, name: &str) {
        self.push_event(RawEvent::new(handle, mask, cookie, name));
    }

    /// Queue arbitrary bytes, delivered as if they were one record.
    pub fn push_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.state().records.push_back(bytes.into());
    }

    /// Simulate the kernel dropping a watch on its own (e.g. the directory
    /// was deleted). Returns the handle it had.
    pub fn drop_watch(&self, path: impl AsRef<Path>) -> Option<WatchHandle> {
        self.state()
            .watches
            .remove(path.as_ref())
            .map(|w| w.handle)
    }

    pub fn handle_for(&self, path: impl AsRef<Path>) -> Option<WatchHandle> {
        self.state().watches.get(path.as_ref()).map(|w| w.handle)
    }

    pub fn mask_for(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.state().watches.get(path.as_ref()).map(|w| w.mask)
    }

    pub fn watch_count(&self) -> usize {
        self.state().watches.len()
    }

    /// Paths with an active watch, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.state().watches.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Handles passed to `remove_watch` that were still active.
    pub fn removed_handles(&self) -> Vec<WatchHandle> {
        self.state().removed.clone()
    }

    /// Number of `add_watch` calls, successful or not.
    pub fn add_watch_calls(&self) -> usize {
        self.state().add_calls
    }

    pub fn pending_records(&self) -> usize {
        self.state().records.len()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Kernel for FakeKernel {
    fn add_watch(&mut self, path: &Path, mask: u32) -> io::Result<WatchHandle> {
        let mut state = self.state();
        state.add_calls += 1;

        if let Some(errno) = state.failures.get(path) {
            return Err(io::Error::from_raw_os_error(*errno));
        }

        if let Some(watch) = state.watches.get_mut(path) {
            if mask & WatchFlags::MASK_ADD.bits() != 0 {
                watch.mask |= mask;
            } else {
                watch.mask = mask;
            }
            return Ok(watch.handle);
        }

        if state.limit.is_some_and(|limit| state.watches.len() >= limit) {
            return Err(io::Error::from_raw_os_error(libc::ENOSPC));
        }

        let handle = WatchHandle::from_raw(state.next_wd);
        state.next_wd += 1;
        state
            .watches
            .insert(path.to_path_buf(), FakeWatch { handle, mask });
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        let mut state = self.state();
        let path = state
            .watches
            .iter()
            .find(|(_, w)| w.handle == handle)
            .map(|(p, _)| p.clone());

        match path {
            Some(path) => {
                state.watches.remove(&path);
                state.removed.push(handle);
                Ok(())
            }
            None => Err(io::Error::from_raw_os_error(libc::EINVAL)),
        }
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state();
        if state.records.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }

        let mut written = 0;
        while let Some(record) = state.records.front() {
            if written + record.len() > buf.len() {
                break;
            }
            buf[written..written + record.len()].copy_from_slice(record);
            written += record.len();
            state.records.pop_front();
        }

        if written == 0 {
            // Same as the kernel: the buffer cannot hold the next record.
            return Err(io::Error::from_raw_os_error(libc::EINVAL));
        }
        Ok(written)
    }

    fn version_at_least(&self, min: KernelVersion) -> bool {
        self.state().version >= min
    }

    fn raw_fd(&self) -> Option<RawFd> {
        None
    }
}
