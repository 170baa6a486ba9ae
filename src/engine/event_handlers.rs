// src/engine/event_handlers.rs

//! Turning raw kernel records into published events.
//!
//! Each handler may update the watch table, the install queue or the
//! rename map, and returns at most one [`WatchEvent`].

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::engine::scheduler::DrainScheduler;
use crate::kernel::{EventMask, Kernel, WatchHandle};
use crate::watch::correlator::{MoveCorrelator, MoveFragment};
use crate::watch::decoder::RawEvent;
use crate::watch::event::WatchEvent;
use crate::watch::installer::RecursiveInstaller;
use crate::watch::policy::WatchPolicy;
use crate::watch::table::WatchTable;

/// Mutable state the handlers work on, borrowed from the facade.
pub(crate) struct EventContext<'a> {
    pub table: &'a mut WatchTable,
    pub installer: &'a mut RecursiveInstaller,
    pub moves: &'a mut MoveCorrelator,
    pub kernel: &'a mut dyn Kernel,
    pub scheduler: &'a mut dyn DrainScheduler,
}

/// Handle one decoded record.
pub(crate) fn handle_raw_event(
    cx: &mut EventContext<'_>,
    raw: RawEvent,
    now: Instant,
) -> Option<WatchEvent> {
    let mask = raw.mask;

    if mask.contains(EventMask::Q_OVERFLOW) {
        warn!("kernel event queue overflowed; events were lost");
        return Some(WatchEvent::QueueOverflowed);
    }

    let Some(dir) = cx.table.path_for(raw.handle).map(Path::to_path_buf) else {
        if mask.contains(EventMask::IGNORED) {
            trace!(handle = %raw.handle, "ignored notice for a forgotten watch");
        } else {
            debug!(handle = %raw.handle, ?mask, "event for unknown watch dropped");
        }
        return None;
    };

    if mask.contains(EventMask::IGNORED) {
        trace!(path = ?dir, handle = %raw.handle, "kernel dropped watch");
        cx.table.remove(raw.handle);
        return None;
    }

    let path = if raw.name.is_empty() {
        dir.clone()
    } else {
        dir.join(&raw.name)
    };
    let is_dir = mask.contains(EventMask::ISDIR);

    if mask.contains(EventMask::UNMOUNT) {
        return handle_unmount(cx, path);
    }
    if mask.contains(EventMask::CREATE) {
        return handle_created(cx, raw.handle, path, is_dir);
    }
    if mask.contains(EventMask::DELETE) {
        return handle_deleted(cx, path, is_dir);
    }
    if mask.contains(EventMask::DELETE_SELF) {
        return handle_delete_self(cx, path, is_dir);
    }
    if mask.contains(EventMask::MOVED_FROM) {
        handle_moved_from(cx, raw.cookie, path, is_dir, now);
        return None;
    }
    if mask.contains(EventMask::MOVED_TO) {
        return handle_moved_to(cx, raw.handle, raw.cookie, path, is_dir);
    }
    if mask.contains(EventMask::MOVE_SELF) {
        debug!(path = ?path, "watched directory moved");
        return None;
    }

    if mask.contains(EventMask::MODIFY) {
        Some(WatchEvent::Modified { path })
    } else if mask.contains(EventMask::ATTRIB) {
        Some(WatchEvent::AttributeChanged { path })
    } else if mask.contains(EventMask::CLOSE_WRITE) {
        Some(WatchEvent::ClosedAfterWrite { path })
    } else if mask.contains(EventMask::CLOSE_NOWRITE) {
        Some(WatchEvent::ClosedAfterRead { path })
    } else if mask.contains(EventMask::OPEN) {
        Some(WatchEvent::Opened { path })
    } else if mask.contains(EventMask::ACCESS) {
        Some(WatchEvent::Accessed { path })
    } else {
        debug!(path = ?path, ?mask, "record without a known event class");
        None
    }
}

/// A rename source that never saw its destination.
///
/// Only the watches the fragment took with it are released; whatever now
/// lives at the old path is left alone.
pub(crate) fn handle_evicted_move(cx: &mut EventContext<'_>, fragment: MoveFragment) {
    let Some(detached) = fragment.detached else {
        return;
    };
    let orphaned = cx.table.orphaned_handles(&detached);
    release_handles(cx.kernel, &orphaned);
    debug!(
        source = ?fragment.source,
        released = orphaned.len(),
        "directory moved out of the watched tree"
    );
}

pub(crate) fn release_handles(kernel: &mut dyn Kernel, handles: &[WatchHandle]) {
    for handle in handles {
        if let Err(err) = kernel.remove_watch(*handle) {
            trace!(%handle, error = %err, "kernel had already dropped watch");
        }
    }
}

fn handle_unmount(cx: &mut EventContext<'_>, path: PathBuf) -> Option<WatchEvent> {
    // The kernel drops these watches itself and follows up with IGNORED.
    let forgotten = cx.table.remove_subtree(&path);
    debug!(path = ?path, forgotten = forgotten.len(), "filesystem unmounted");
    Some(WatchEvent::Unmounted { path })
}

fn handle_created(
    cx: &mut EventContext<'_>,
    parent: WatchHandle,
    path: PathBuf,
    is_dir: bool,
) -> Option<WatchEvent> {
    if is_dir {
        extend_into(cx, parent, &path);
    }
    Some(WatchEvent::Created { path, is_dir })
}

fn handle_deleted(cx: &mut EventContext<'_>, path: PathBuf, is_dir: bool) -> Option<WatchEvent> {
    if is_dir {
        let forgotten = cx.table.remove_subtree(&path);
        trace!(path = ?path, forgotten = forgotten.len(), "deleted directory retracted");
    }
    Some(WatchEvent::Deleted { path, is_dir })
}

fn handle_delete_self(
    cx: &mut EventContext<'_>,
    path: PathBuf,
    is_dir: bool,
) -> Option<WatchEvent> {
    cx.table.remove_subtree(&path);
    let parent_watched = path.parent().is_some_and(|p| cx.table.is_watching(p));
    if parent_watched {
        // The parent's DELETE record reports this one.
        None
    } else {
        Some(WatchEvent::Deleted { path, is_dir })
    }
}

fn handle_moved_from(
    cx: &mut EventContext<'_>,
    cookie: u32,
    path: PathBuf,
    is_dir: bool,
    now: Instant,
) {
    trace!(path = ?path, cookie, "rename source");
    let mut fragment = MoveFragment::new(cookie, path, is_dir, now);
    if is_dir {
        let detached = cx.table.detach_subtree(&fragment.source);
        fragment = fragment.with_detached(detached);
    }
    if let Some(evicted) = cx.moves.moved_from(fragment) {
        handle_evicted_move(cx, evicted);
    }
}

fn handle_moved_to(
    cx: &mut EventContext<'_>,
    parent: WatchHandle,
    cookie: u32,
    path: PathBuf,
    is_dir: bool,
) -> Option<WatchEvent> {
    match cx.moves.moved_to(cookie) {
        Some(fragment) => {
            if let Some(detached) = fragment.detached {
                let displaced = cx.table.attach_subtree(detached, &path);
                release_handles(cx.kernel, &displaced);
            }
            Some(WatchEvent::Moved {
                from: fragment.source,
                to: path,
            })
        }
        None => {
            // Came from outside the watched tree.
            if is_dir {
                extend_into(cx, parent, &path);
            }
            Some(WatchEvent::Created { path, is_dir })
        }
    }
}

/// Queue a directory that appeared under a watched parent, using the
/// parent watch's policy.
fn extend_into(cx: &mut EventContext<'_>, parent: WatchHandle, path: &Path) {
    let Some(policy) = cx.table.policy_for(parent).map(Arc::clone) else {
        return;
    };
    if !may_descend(&policy, path) {
        trace!(path = ?path, "new directory not descended into");
        return;
    }
    if cx.installer.enqueue(path, policy) {
        cx.scheduler.schedule_drain();
    }
}

fn may_descend(policy: &WatchPolicy, path: &Path) -> bool {
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            policy
                .filter
                .should_recurse(parent, name, policy.include_hidden)
        }
        _ => false,
    }
}
