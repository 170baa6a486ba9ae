// tests/event_stream.rs

use std::path::PathBuf;

use kinotify::fs::mock::MockFileSystem;
use kinotify::kernel::{EventMask, WatchHandle};
use kinotify::watch::{RawEvent, WatchEvent, WatchPolicy};
use kinotify_test_utils::{init_tracing, Harness};

fn harness() -> Harness {
    let fs = MockFileSystem::new();
    fs.add_dir("/w/a/b");
    fs.add_dir("/w/c");
    let mut h = Harness::new(fs);
    h.watch_tree("/w", WatchPolicy::default());
    h
}

#[test]
fn plain_classes_map_to_their_events_in_order() {
    init_tracing();
    let mut h = harness();

    h.emit("/w/c", EventMask::OPEN, 0, "f");
    h.emit("/w/c", EventMask::ACCESS, 0, "f");
    h.emit("/w/c", EventMask::MODIFY, 0, "f");
    h.emit("/w/c", EventMask::ATTRIB, 0, "f");
    h.emit("/w/c", EventMask::CLOSE_WRITE, 0, "f");
    h.emit("/w/c", EventMask::CLOSE_NOWRITE, 0, "g");

    let path = PathBuf::from("/w/c/f");
    assert_eq!(
        h.pump(),
        vec![
            WatchEvent::Opened { path: path.clone() },
            WatchEvent::Accessed { path: path.clone() },
            WatchEvent::Modified { path: path.clone() },
            WatchEvent::AttributeChanged { path: path.clone() },
            WatchEvent::ClosedAfterWrite { path },
            WatchEvent::ClosedAfterRead {
                path: PathBuf::from("/w/c/g")
            },
        ]
    );
}

#[test]
fn deleting_a_directory_retracts_its_subtree_once() {
    init_tracing();
    let mut h = harness();

    // rmdir of /w/a/b then /w/a, as the kernel reports it.
    h.emit("/w/a/b", EventMask::DELETE_SELF | EventMask::ISDIR, 0, "");
    h.emit("/w/a", EventMask::DELETE | EventMask::ISDIR, 0, "b");
    h.emit("/w/a", EventMask::DELETE_SELF | EventMask::ISDIR, 0, "");
    h.emit("/w", EventMask::DELETE | EventMask::ISDIR, 0, "a");

    let events = h.pump();

    assert_eq!(
        events,
        vec![
            WatchEvent::Deleted {
                path: PathBuf::from("/w/a/b"),
                is_dir: true
            },
            WatchEvent::Deleted {
                path: PathBuf::from("/w/a"),
                is_dir: true
            },
        ]
    );
    assert!(!h.facade.watching("/w/a"));
    assert!(!h.facade.watching("/w/a/b"));
    assert!(h.facade.watching("/w/c"));
}

#[test]
fn parent_delete_before_self_delete_is_reported_once() {
    init_tracing();
    let mut h = harness();
    let c = h.handle("/w/c");

    h.emit("/w", EventMask::DELETE | EventMask::ISDIR, 0, "c");
    h.kernel.emit(c, EventMask::DELETE_SELF | EventMask::ISDIR, 0, "");
    h.kernel.emit(c, EventMask::IGNORED, 0, "");

    assert_eq!(
        h.pump(),
        vec![WatchEvent::Deleted {
            path: PathBuf::from("/w/c"),
            is_dir: true
        }]
    );
    assert!(!h.facade.watching("/w/c"));
}

#[test]
fn deleted_root_is_reported_by_its_own_watch() {
    init_tracing();
    let mut h = harness();

    h.emit("/w", EventMask::DELETE_SELF | EventMask::ISDIR, 0, "");

    assert_eq!(
        h.pump(),
        vec![WatchEvent::Deleted {
            path: PathBuf::from("/w"),
            is_dir: true
        }]
    );
    assert_eq!(h.facade.watch_count(), 0);
}

#[test]
fn file_delete_leaves_watches_alone() {
    init_tracing();
    let mut h = harness();

    h.emit("/w/c", EventMask::DELETE, 0, "f.txt");

    assert_eq!(
        h.pump(),
        vec![WatchEvent::Deleted {
            path: PathBuf::from("/w/c/f.txt"),
            is_dir: false
        }]
    );
    assert_eq!(h.facade.watch_count(), 4);
}

#[test]
fn overflow_is_published_without_a_path() {
    init_tracing();
    let mut h = harness();

    h.kernel
        .emit(WatchHandle::from_raw(-1), EventMask::Q_OVERFLOW, 0, "");

    let events = h.pump();
    assert_eq!(events, vec![WatchEvent::QueueOverflowed]);
    assert_eq!(events[0].path(), None);
}

#[test]
fn unknown_handles_are_dropped_and_the_rest_delivered() {
    init_tracing();
    let mut h = harness();

    h.kernel
        .emit(WatchHandle::from_raw(4242), EventMask::MODIFY, 0, "ghost");
    h.emit("/w", EventMask::MODIFY, 0, "real");

    assert_eq!(
        h.pump(),
        vec![WatchEvent::Modified {
            path: PathBuf::from("/w/real")
        }]
    );
}

#[test]
fn malformed_tail_does_not_lose_earlier_records() {
    init_tracing();
    let mut h = harness();
    let w = h.handle("/w");

    let mut bytes = Vec::new();
    RawEvent::new(w, EventMask::CREATE, 0, "one").encode_into(&mut bytes);
    RawEvent::new(w, EventMask::CREATE, 0, "two").encode_into(&mut bytes);
    bytes.extend_from_slice(&[0xde, 0xad, 0xbe]);
    h.kernel.push_bytes(bytes);

    let events = h.pump();
    assert_eq!(events.len(), 2);
    assert_eq!(events[1].path(), Some(PathBuf::from("/w/two").as_path()));
}

#[test]
fn short_read_yields_no_events() {
    init_tracing();
    let mut h = harness();

    h.kernel.push_bytes(vec![1u8, 2, 3]);
    let step = h.facade.on_readable();

    assert!(step.events.is_empty());
    assert!(!step.would_block);
}

#[test]
fn unmount_and_ignored_forget_watches() {
    init_tracing();
    let mut h = harness();
    let a = h.handle("/w/a");
    let b = h.handle("/w/a/b");

    h.kernel.emit(a, EventMask::UNMOUNT, 0, "");
    h.kernel.emit(b, EventMask::IGNORED, 0, "");
    h.kernel.emit(a, EventMask::IGNORED, 0, "");

    assert_eq!(
        h.pump(),
        vec![WatchEvent::Unmounted {
            path: PathBuf::from("/w/a")
        }]
    );
    assert!(!h.facade.watching("/w/a"));
    assert!(!h.facade.watching("/w/a/b"));
    assert_eq!(h.facade.watch_count(), 2);
}

#[test]
fn remove_watch_stops_events_for_the_subtree() {
    init_tracing();
    let mut h = harness();
    let b = h.handle("/w/a/b");

    assert!(h.facade.remove_watch("/w/a"));
    assert!(h.kernel.removed_handles().contains(&b));

    h.kernel.emit(b, EventMask::MODIFY, 0, "late");
    assert!(h.pump().is_empty());
    assert!(h.facade.watching("/w"));
    assert!(!h.facade.remove_watch("/w/a"));
}

#[test]
fn entries_made_before_a_new_directory_is_watched_are_not_reported() {
    init_tracing();
    let mut h = harness();

    // mkdir /w/c/new && mkdir /w/c/new/inner && touch /w/c/new/f, all before
    // the watch on /w/c/new exists.
    h.fs.add_dir("/w/c/new/inner");
    h.fs.add_file("/w/c/new/f");
    h.emit("/w/c", EventMask::CREATE | EventMask::ISDIR, 0, "new");

    let step = h.facade.on_readable();
    assert_eq!(
        step.events,
        vec![WatchEvent::Created {
            path: PathBuf::from("/w/c/new"),
            is_dir: true
        }]
    );
    assert!(!h.facade.watching("/w/c/new"));

    h.drain_all();

    // The walk still picks up the subdirectory, but nothing is published
    // for what was created inside the window.
    assert!(h.facade.watching("/w/c/new"));
    assert!(h.facade.watching("/w/c/new/inner"));
    assert!(h.pump().is_empty());
}
