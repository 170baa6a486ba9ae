// tests/batch_yielding.rs

use kinotify::engine::WatcherOptions;
use kinotify::kernel::EventMask;
use kinotify::watch::{WatchEvent, WatchPolicy};
use kinotify_test_utils::builders::mock_tree;
use kinotify_test_utils::{init_tracing, Harness};

fn options(batch_size: usize) -> WatcherOptions {
    WatcherOptions {
        batch_size,
        ..WatcherOptions::default()
    }
}

#[test]
fn large_tree_takes_several_scheduling_turns() {
    init_tracing();

    let (fs, dirs) = mock_tree("/w", 2, 10);
    assert_eq!(dirs, 111);
    let mut h = Harness::with_options(fs, options(25));

    let steps = h.watch_tree("/w", WatchPolicy::default());

    assert_eq!(steps.len(), 5);
    assert!(steps.iter().all(|s| s.installed + s.skipped <= 25));
    assert!(steps[..4].iter().all(|s| s.more_pending));
    assert!(!steps[4].more_pending);
    assert_eq!(h.scheduler.requests(), 5);
    assert_eq!(h.facade.watch_count(), dirs);
}

#[test]
fn one_turn_never_installs_more_than_a_batch() {
    init_tracing();

    let (fs, _) = mock_tree("/w", 1, 50);
    let mut h = Harness::with_options(fs, options(10));

    assert!(h.facade.add_watch("/w", WatchPolicy::default()));
    let step = h.facade.drain_pending();

    assert_eq!(step.installed, 10);
    assert!(step.more_pending);
    assert_eq!(h.facade.pending_count(), 41);
    assert_eq!(h.facade.watch_count(), 10);
}

#[test]
fn events_are_handled_between_install_turns() {
    init_tracing();

    let (fs, dirs) = mock_tree("/w", 1, 30);
    let mut h = Harness::with_options(fs, options(10));

    assert!(h.facade.add_watch("/w", WatchPolicy::default()));
    h.facade.drain_pending();

    // The root is live while most of the tree is still queued.
    h.emit("/w", EventMask::CREATE, 0, "early.txt");
    let step = h.facade.on_readable();
    assert_eq!(
        step.events,
        vec![WatchEvent::Created {
            path: "/w/early.txt".into(),
            is_dir: false
        }]
    );
    assert!(h.facade.pending_count() > 0);

    h.drain_all();
    assert_eq!(h.facade.watch_count(), dirs);
}

#[test]
fn only_one_drain_is_outstanding_at_a_time() {
    init_tracing();

    let (fs, _) = mock_tree("/w", 1, 3);
    fs.add_dir("/x");
    fs.add_dir("/y");
    let mut h = Harness::new(fs);

    h.facade.add_watch("/w", WatchPolicy::default());
    h.facade.add_watch("/x", WatchPolicy::default());
    h.facade.add_watch("/y", WatchPolicy::default());
    assert_eq!(h.scheduler.requests(), 1);

    let steps = h.drain_all();
    assert_eq!(steps.len(), 1);
    assert_eq!(h.facade.watch_count(), 6);
}
