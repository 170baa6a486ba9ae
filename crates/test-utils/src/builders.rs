#![allow(dead_code)]

use std::path::PathBuf;

use kinotify::config::{ConfigFile, DefaultSection, RawConfigFile, WatchRoot, WatcherSection};
use kinotify::fs::mock::MockFileSystem;
use kinotify::types::{EventClass, FlagName};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                watcher: WatcherSection::default(),
                default: DefaultSection::default(),
                watch: Vec::new(),
            },
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.watcher.batch_size = batch_size;
        self
    }

    pub fn with_default_events(mut self, events: &[EventClass]) -> Self {
        self.config.default.events = events.to_vec();
        self
    }

    pub fn with_default_flags(mut self, flags: &[FlagName]) -> Self {
        self.config.default.flags = flags.to_vec();
        self
    }

    pub fn with_global_exclude(mut self, pattern: &str) -> Self {
        self.config.default.exclude.push(pattern.to_string());
        self
    }

    pub fn with_root(mut self, root: WatchRoot) -> Self {
        self.config.watch.push(root);
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for one `[[watch]]` entry.
pub struct WatchRootBuilder {
    root: WatchRoot,
}

impl WatchRootBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            root: WatchRoot::new(path),
        }
    }

    pub fn events(mut self, events: &[EventClass]) -> Self {
        self.root.events = Some(events.to_vec());
        self
    }

    pub fn include_hidden(mut self, val: bool) -> Self {
        self.root.include_hidden = Some(val);
        self
    }

    pub fn exclude(mut self, pattern: &str) -> Self {
        self.root.exclude.push(pattern.to_string());
        self
    }

    pub fn build(self) -> WatchRoot {
        self.root
    }
}

/// Mock tree with `depth` levels of `fanout` directories under `root`,
/// named `d0`, `d1`, ... Returns the tree and the number of directories,
/// root included.
pub fn mock_tree(root: &str, depth: usize, fanout: usize) -> (MockFileSystem, usize) {
    let fs = MockFileSystem::new();
    fs.add_dir(root);
    let mut level = vec![PathBuf::from(root)];
    let mut count = 1;
    for _ in 0..depth {
        let mut next = Vec::with_capacity(level.len() * fanout);
        for dir in &level {
            for i in 0..fanout {
                let child = dir.join(format!("d{i}"));
                fs.add_dir(&child);
                fs.add_file(child.join("file.txt"));
                next.push(child);
            }
        }
        count += next.len();
        level = next;
    }
    (fs, count)
}
