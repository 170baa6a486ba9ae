use std::path::Path;
use std::sync::Arc;

use kinotify::engine::{KInotify, ManualScheduler, WatcherOptions};
use kinotify::fs::mock::MockFileSystem;
use kinotify::kernel::fake::FakeKernel;
use kinotify::kernel::{EventMask, WatchHandle};
use kinotify::watch::{DrainStep, WatchEvent, WatchPolicy};

/// A facade wired to a fake kernel, a mock tree and a manual scheduler.
///
/// The kernel, tree and scheduler are clones sharing state with the ones
/// inside the facade, so tests can inject events and mutate the tree.
pub struct Harness {
    pub facade: KInotify<FakeKernel>,
    pub kernel: FakeKernel,
    pub fs: MockFileSystem,
    pub scheduler: ManualScheduler,
    served: usize,
}

impl Harness {
    pub fn new(fs: MockFileSystem) -> Self {
        Self::with_kernel(FakeKernel::new(), fs, WatcherOptions::default())
    }

    pub fn with_options(fs: MockFileSystem, options: WatcherOptions) -> Self {
        Self::with_kernel(FakeKernel::new(), fs, options)
    }

    pub fn with_kernel(kernel: FakeKernel, fs: MockFileSystem, options: WatcherOptions) -> Self {
        let scheduler = ManualScheduler::new();
        let facade = KInotify::new(
            Ok(kernel.clone()),
            Arc::new(fs.clone()),
            Box::new(scheduler.clone()),
            &options,
        );
        Self {
            facade,
            kernel,
            fs,
            scheduler,
            served: 0,
        }
    }

    /// `add_watch` followed by draining to completion.
    pub fn watch_tree(&mut self, root: impl AsRef<Path>, policy: WatchPolicy) -> Vec<DrainStep> {
        assert!(self.facade.add_watch(root, policy), "add_watch rejected");
        self.drain_all()
    }

    /// Serve drain requests until none are outstanding, the way an event
    /// loop would. Returns the step of every turn taken.
    pub fn drain_all(&mut self) -> Vec<DrainStep> {
        let mut steps = Vec::new();
        while self.served < self.scheduler.requests() {
            self.served += 1;
            steps.push(self.facade.drain_pending());
        }
        steps
    }

    /// Read everything queued in the fake kernel, then serve drains.
    pub fn pump(&mut self) -> Vec<WatchEvent> {
        let mut events = Vec::new();
        loop {
            let step = self.facade.on_readable();
            events.extend(step.events);
            if step.would_block {
                break;
            }
        }
        self.drain_all();
        events
    }

    /// Handle the fake kernel issued for `path`. Panics if not watched.
    pub fn handle(&self, path: impl AsRef<Path>) -> WatchHandle {
        let path = path.as_ref();
        self.kernel
            .handle_for(path)
            .unwrap_or_else(|| panic!("{} is not watched", path.display()))
    }

    /// Queue a record on the watch of `dir`.
    pub fn emit(&self, dir: impl AsRef<Path>, mask: EventMask, cookie: u32, name: &str) {
        self.kernel.emit(self.handle(dir), mask, cookie, name);
    }
}
