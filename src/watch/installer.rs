// src/watch/installer.rs

//! Breadth-first installation of watches over a directory tree.
//!
//! Work is split into batches so one huge tree cannot starve event
//! processing: each [`RecursiveInstaller::drain_batch`] installs at most
//! `batch_size` directories and reports whether more remain.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::errors::WatchError;
use crate::fs::{EntryKind, FileSystem};
use crate::kernel::Kernel;
use crate::watch::path_utils::normalize_path;
use crate::watch::policy::WatchPolicy;
use crate::watch::table::{InstallOutcome, WatchTable};

/// Default number of directories installed per batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A directory waiting for its watch.
#[derive(Debug, Clone)]
pub struct PendingDir {
    pub path: PathBuf,
    pub policy: Arc<WatchPolicy>,
}

/// What one batch accomplished.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStep {
    /// New watches installed.
    pub installed: usize,
    /// Entries dequeued without a new watch (filtered, already watched or failed).
    pub skipped: usize,
    /// This batch hit the watch limit for the first time in the process.
    pub limit_reached: bool,
    /// Entries are still queued; another batch must be scheduled.
    pub more_pending: bool,
}

#[derive(Debug)]
pub struct RecursiveInstaller {
    queue: VecDeque<PendingDir>,
    batch_size: usize,
    drain_scheduled: bool,
}

impl Default for RecursiveInstaller {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl RecursiveInstaller {
    pub fn new(batch_size: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            batch_size: batch_size.max(1),
            drain_scheduled: false,
        }
    }

    /// Queue `path` for installation.
    ///
    /// Returns `true` when the caller must schedule a drain; at most one
    /// drain is outstanding at a time.
    pub fn enqueue(&mut self, path: impl Into<PathBuf>, policy: Arc<WatchPolicy>) -> bool {
        let path = normalize_path(&path.into());
        trace!(path = ?path, "queued for watch");
        self.queue.push_back(PendingDir { path, policy });
        if self.drain_scheduled {
            false
        } else {
            self.drain_scheduled = true;
            true
        }
    }

    /// Install up to one batch of queued directories.
    ///
    /// Every successfully watched directory has its subdirectories queued
    /// behind it, so the tree is covered breadth first. A failure on one
    /// entry is logged and the batch continues with the next.
    ///
    /// Clears the scheduled flag; if `more_pending` is set the caller must
    /// call [`RecursiveInstaller::mark_scheduled`] and schedule again.
    pub fn drain_batch(
        &mut self,
        table: &mut WatchTable,
        kernel: &mut dyn Kernel,
        fs: &dyn FileSystem,
    ) -> DrainStep {
        self.drain_scheduled = false;
        let mut step = DrainStep::default();

        for _ in 0..self.batch_size {
            let Some(dir) = self.queue.pop_front() else {
                break;
            };

            match table.install(kernel, &dir.path, &dir.policy) {
                Ok(InstallOutcome::Installed(_)) => {
                    step.installed += 1;
                    self.queue_children(&dir, fs);
                }
                Ok(InstallOutcome::AlreadyWatched(_)) | Ok(InstallOutcome::Filtered) => {
                    step.skipped += 1;
                }
                Err(WatchError::WatchLimitReached) => {
                    step.skipped += 1;
                    step.limit_reached = true;
                }
                Err(err) => {
                    debug!(path = ?dir.path, error = %err, "skipping directory");
                    step.skipped += 1;
                }
            }
        }

        step.more_pending = !self.queue.is_empty();
        debug!(
            installed = step.installed,
            skipped = step.skipped,
            remaining = self.queue.len(),
            "install batch done"
        );
        step
    }

    pub fn mark_scheduled(&mut self) {
        self.drain_scheduled = true;
    }

    pub fn is_drain_scheduled(&self) -> bool {
        self.drain_scheduled
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn queue_children(&mut self, dir: &PendingDir, fs: &dyn FileSystem) {
        let entries = match fs.read_dir(&dir.path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = ?dir.path, error = %err, "cannot list directory, children not watched");
                return;
            }
        };

        for entry in entries {
            if !dir
                .policy
                .filter
                .should_recurse(&dir.path, &entry.name, dir.policy.include_hidden)
            {
                continue;
            }
            let child = dir.path.join(&entry.name);
            let is_dir = match entry.kind {
                EntryKind::Dir => true,
                EntryKind::Other => false,
                EntryKind::Unknown => fs.is_dir_nofollow(&child),
            };
            if is_dir {
                self.queue.push_back(PendingDir {
                    path: child,
                    policy: Arc::clone(&dir.policy),
                });
            }
        }
    }
}
