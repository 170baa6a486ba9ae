// tests/end_to_end_linux.rs

#![cfg(target_os = "linux")]

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;

use kinotify::engine::{serve, spawn_watcher, WatcherHandle, WatcherOptions, WatcherOutput};
use kinotify::kernel::EventMask;
use kinotify::watch::{WatchEvent, WatchPolicy};
use kinotify_test_utils::{init_tracing, with_timeout};

type TestResult = Result<(), Box<dyn Error>>;

/// Wait for the first event matching `pred`, skipping the others.
async fn expect_event(
    rx: &mut mpsc::Receiver<WatcherOutput>,
    pred: impl Fn(&WatchEvent) -> bool,
) -> WatchEvent {
    with_timeout(async {
        loop {
            match rx.recv().await {
                Some(WatcherOutput::Event(event)) if pred(&event) => return event,
                Some(_) => continue,
                None => panic!("watcher stopped"),
            }
        }
    })
    .await
}

async fn wait_until_watching(handle: &WatcherHandle, path: &Path, expected: bool) -> TestResult {
    with_timeout(async {
        while handle.watching(path).await? != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok::<(), Box<dyn Error>>(())
    })
    .await
}

#[tokio::test]
async fn create_rename_delete_scenario() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let root = tmp.path().canonicalize()?;
    let (handle, mut rx) = spawn_watcher(WatcherOptions::default())?;

    let policy = WatchPolicy::new(
        EventMask::CREATE | EventMask::DELETE | EventMask::MODIFY | EventMask::MOVE,
    );
    assert!(handle.add_watch(root.clone(), policy).await?);
    wait_until_watching(&handle, &root, true).await?;

    let a = root.join("a");
    fs::create_dir(&a)?;
    let created = expect_event(&mut rx, |e| e.path() == Some(a.as_path())).await;
    assert_eq!(
        created,
        WatchEvent::Created {
            path: a.clone(),
            is_dir: true
        }
    );
    wait_until_watching(&handle, &a, true).await?;

    let f = a.join("f.txt");
    fs::File::create(&f)?;
    let created = expect_event(&mut rx, |e| e.path() == Some(f.as_path())).await;
    assert_eq!(
        created,
        WatchEvent::Created {
            path: f.clone(),
            is_dir: false
        }
    );

    let g = a.join("g.txt");
    fs::rename(&f, &g)?;
    let moved = expect_event(&mut rx, |e| matches!(e, WatchEvent::Moved { .. })).await;
    assert_eq!(
        moved,
        WatchEvent::Moved {
            from: f.clone(),
            to: g.clone()
        }
    );

    fs::remove_dir_all(&a)?;
    let deleted = expect_event(&mut rx, |e| {
        matches!(e, WatchEvent::Deleted { path, .. } if path == &a)
    })
    .await;
    assert_eq!(
        deleted,
        WatchEvent::Deleted {
            path: a.clone(),
            is_dir: true
        }
    );
    wait_until_watching(&handle, &a, false).await?;

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn nested_tree_is_covered_and_removable() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let root = tmp.path().canonicalize()?;
    let deep: PathBuf = root.join("x/y/z");
    fs::create_dir_all(&deep)?;
    fs::create_dir_all(root.join(".hidden/inner"))?;

    let options = WatcherOptions {
        batch_size: 1,
        ..WatcherOptions::default()
    };
    let (handle, mut rx) = spawn_watcher(options)?;
    assert!(handle.add_watch(root.clone(), WatchPolicy::default()).await?);
    wait_until_watching(&handle, &deep, true).await?;
    assert!(!handle.watching(root.join(".hidden")).await?);

    let file = deep.join("data.bin");
    fs::write(&file, b"payload")?;
    expect_event(&mut rx, |e| {
        matches!(e, WatchEvent::ClosedAfterWrite { path } if path == &file)
    })
    .await;

    assert!(handle.remove_watch(root.join("x")).await?);
    assert!(!handle.watching(&deep).await?);
    assert!(handle.watching(&root).await?);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::test]
async fn roots_register_while_the_output_channel_is_full() -> TestResult {
    init_tracing();

    let tmp = tempfile::tempdir()?;
    let base = tmp.path().canonicalize()?;
    let busy = base.join("busy");
    let quiet = base.join("quiet");
    fs::create_dir(&busy)?;
    fs::create_dir(&quiet)?;

    let options = WatcherOptions {
        output_capacity: 1,
        ..WatcherOptions::default()
    };
    let (handle, mut rx) = spawn_watcher(options)?;
    let policy = || WatchPolicy::new(EventMask::CREATE);

    assert!(handle.add_watch(busy.clone(), policy()).await?);
    wait_until_watching(&handle, &busy, true).await?;

    // Nobody is reading yet, so the watcher blocks publishing these.
    for i in 0..10 {
        fs::File::create(busy.join(format!("f{i}")))?;
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let mut created = Vec::new();
    let quiet_watched = async {
        while !handle.watching(&quiet).await.unwrap_or(false) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    with_timeout(serve(
        &handle,
        &mut rx,
        vec![(quiet.clone(), policy())],
        quiet_watched,
        |output| {
            if let WatcherOutput::Event(WatchEvent::Created { path, .. }) = output {
                created.push(path);
            }
        },
    ))
    .await?;

    while created.len() < 10 {
        let event = expect_event(&mut rx, |e| matches!(e, WatchEvent::Created { .. })).await;
        created.extend(event.path().map(Path::to_path_buf));
    }
    for i in 0..10 {
        assert!(created.contains(&busy.join(format!("f{i}"))));
    }

    handle.shutdown().await?;
    Ok(())
}
