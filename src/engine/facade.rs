// src/engine/facade.rs

//! Synchronous core of the watcher.
//!
//! [`KInotify`] owns the kernel handle and all watch bookkeeping but never
//! waits on anything: its owner calls [`KInotify::on_readable`] when the
//! descriptor is readable and [`KInotify::drain_pending`] whenever the
//! injected [`DrainScheduler`] asks for it. Both return what happened so
//! the owner decides how to publish it.
//!
//! Tests drive it directly with a fake kernel, a mock filesystem and a
//! manual scheduler, without Tokio.

use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::engine::event_handlers::{
    handle_evicted_move, handle_raw_event, release_handles, EventContext,
};
use crate::engine::scheduler::DrainScheduler;
use crate::engine::WatcherOptions;
use crate::fs::FileSystem;
use crate::kernel::Kernel;
use crate::watch::correlator::MoveCorrelator;
use crate::watch::decoder::{decode, HEADER_SIZE};
use crate::watch::event::WatchEvent;
use crate::watch::installer::{DrainStep, RecursiveInstaller};
use crate::watch::path_utils::normalize_path;
use crate::watch::policy::WatchPolicy;
use crate::watch::table::WatchTable;

/// Outcome of one [`KInotify::on_readable`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadStep {
    /// Published events, in kernel order.
    pub events: Vec<WatchEvent>,
    /// Nothing was queued; the owner should wait for readiness again.
    pub would_block: bool,
}

pub struct KInotify<K: Kernel> {
    kernel: Option<K>,
    fs: Arc<dyn FileSystem>,
    scheduler: Box<dyn DrainScheduler>,
    table: WatchTable,
    installer: RecursiveInstaller,
    moves: MoveCorrelator,
    buf: Vec<u8>,
}

impl<K: Kernel> fmt::Debug for KInotify<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KInotify")
            .field("available", &self.available())
            .field("watches", &self.table.len())
            .field("pending", &self.installer.pending())
            .field("pending_moves", &self.moves.len())
            .finish_non_exhaustive()
    }
}

impl<K: Kernel> KInotify<K> {
    /// Build the facade around an already opened (or failed) kernel handle.
    ///
    /// A failed open or a kernel older than `options.min_kernel_version`
    /// leaves the facade unavailable; every operation then reports failure
    /// without touching the kernel.
    pub fn new(
        kernel: io::Result<K>,
        fs: Arc<dyn FileSystem>,
        scheduler: Box<dyn DrainScheduler>,
        options: &WatcherOptions,
    ) -> Self {
        let kernel = match kernel {
            Ok(kernel) if kernel.version_at_least(options.min_kernel_version) => Some(kernel),
            Ok(_) => {
                warn!(
                    required = %options.min_kernel_version,
                    "kernel too old for inotify, file watching disabled"
                );
                None
            }
            Err(err) => {
                warn!(error = %err, "failed to open inotify, file watching disabled");
                None
            }
        };

        Self {
            kernel,
            fs,
            scheduler,
            table: WatchTable::new(),
            installer: RecursiveInstaller::new(options.batch_size),
            moves: MoveCorrelator::new(options.move_ttl, options.max_pending_moves),
            buf: vec![0; options.read_buffer_size.max(HEADER_SIZE)],
        }
    }

    pub fn available(&self) -> bool {
        self.kernel.is_some()
    }

    /// Accept `path` and everything below it for asynchronous installation.
    ///
    /// Returns `true` once the root is queued, not once it is watched.
    ///
    /// The same applies to every directory found later: a watch is placed
    /// only after the directory has been seen, either during the walk or
    /// through its [`WatchEvent::Created`] event. Changes inside it before
    /// its watch is placed are not reported. The kernel leaves no way to
    /// close this window, so a directory filled right after it is created
    /// can miss events for its first entries.
    pub fn add_watch(&mut self, path: impl AsRef<Path>, policy: WatchPolicy) -> bool {
        if !self.available() {
            debug!(path = ?path.as_ref(), "add_watch on unavailable watcher");
            return false;
        }
        let path = normalize_path(path.as_ref());
        info!(path = ?path, events = ?policy.events, "watching tree");
        if self.installer.enqueue(path, Arc::new(policy)) {
            self.scheduler.schedule_drain();
        }
        true
    }

    /// Stop watching `path` and every watch nested under it.
    ///
    /// Returns `false` if nothing was watched there. Entries still queued
    /// for that subtree are installed later like any other.
    pub fn remove_watch(&mut self, path: impl AsRef<Path>) -> bool {
        let Some(kernel) = self.kernel.as_mut() else {
            return false;
        };
        let path = normalize_path(path.as_ref());
        let handles = self.table.remove_subtree(&path);
        release_handles(kernel, &handles);
        info!(path = ?path, removed = handles.len(), "stopped watching tree");
        !handles.is_empty()
    }

    pub fn watching(&self, path: impl AsRef<Path>) -> bool {
        self.table.is_watching(path.as_ref())
    }

    /// Install one batch of queued directories.
    ///
    /// Asks the scheduler for another turn when work remains.
    pub fn drain_pending(&mut self) -> DrainStep {
        let Some(kernel) = self.kernel.as_mut() else {
            return DrainStep::default();
        };
        let step = self
            .installer
            .drain_batch(&mut self.table, kernel, self.fs.as_ref());
        if step.more_pending {
            self.installer.mark_scheduled();
            self.scheduler.schedule_drain();
        }
        step
    }

    /// Read once from the kernel and handle every record in that read.
    pub fn on_readable(&mut self) -> ReadStep {
        self.on_readable_at(Instant::now())
    }

    pub fn on_readable_at(&mut self, now: Instant) -> ReadStep {
        let mut step = ReadStep::default();
        let Some(kernel) = self.kernel.as_mut() else {
            step.would_block = true;
            return step;
        };

        let n = match kernel.read_raw(&mut self.buf) {
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {
                step.would_block = true;
                return step;
            }
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return step,
            Err(err) => {
                warn!(error = %err, "failed to read inotify events");
                return step;
            }
        };
        if n < HEADER_SIZE {
            debug!(bytes = n, "short read from inotify, no events this turn");
            return step;
        }

        let records = decode(&self.buf[..n]);
        let mut cx = EventContext {
            table: &mut self.table,
            installer: &mut self.installer,
            moves: &mut self.moves,
            kernel,
            scheduler: self.scheduler.as_mut(),
        };
        step.events = records
            .into_iter()
            .filter_map(|raw| handle_raw_event(&mut cx, raw, now))
            .collect();
        step
    }

    /// Drop rename sources whose destination never arrived.
    ///
    /// Returns how many were evicted.
    pub fn evict_stale_moves(&mut self, now: Instant) -> usize {
        let Some(kernel) = self.kernel.as_mut() else {
            return 0;
        };
        let expired = self.moves.evict_expired(now);
        let count = expired.len();
        let mut cx = EventContext {
            table: &mut self.table,
            installer: &mut self.installer,
            moves: &mut self.moves,
            kernel,
            scheduler: self.scheduler.as_mut(),
        };
        for fragment in expired {
            handle_evicted_move(&mut cx, fragment);
        }
        count
    }

    pub fn watch_count(&self) -> usize {
        self.table.len()
    }

    /// Directories queued but not yet installed.
    pub fn pending_count(&self) -> usize {
        self.installer.pending()
    }

    /// Rename sources waiting for their destination.
    pub fn pending_moves(&self) -> usize {
        self.moves.len()
    }

    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.table.paths()
    }

    pub fn table(&self) -> &WatchTable {
        &self.table
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.kernel.as_ref().and_then(|k| k.raw_fd())
    }
}
