// src/config/model.rs

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::engine::{WatcherOptions, DEFAULT_READ_BUFFER_SIZE};
use crate::errors::Result;
use crate::kernel::KernelVersion;
use crate::types::{EventClass, FlagName};
use crate::watch::filter::{DefaultFilter, GlobFilter, WatchFilter};
use crate::watch::installer::DEFAULT_BATCH_SIZE;
use crate::watch::policy::WatchPolicy;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [watcher]
/// batch_size = 100
/// move_cookie_ttl_ms = 2000
///
/// [default]
/// events = ["create", "delete", "modify", "move"]
/// exclude = ["**/node_modules"]
///
/// [[watch]]
/// path = "/home/user/Documents"
/// include_hidden = true
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub watcher: WatcherSection,

    #[serde(default)]
    pub default: DefaultSection,

    /// Roots from `[[watch]]`.
    #[serde(default)]
    pub watch: Vec<WatchRoot>,
}

/// Validated configuration. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub watcher: WatcherSection,
    pub default: DefaultSection,
    pub watch: Vec<WatchRoot>,
}

/// `[watcher]` section: tuning of the watcher itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatcherSection {
    /// Directories installed per scheduling turn.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Size in bytes of the buffer used for each kernel read.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// How long a rename source waits for its destination.
    #[serde(default = "default_move_cookie_ttl_ms")]
    pub move_cookie_ttl_ms: u64,

    #[serde(default = "default_max_pending_moves")]
    pub max_pending_moves: usize,

    /// Oldest kernel release accepted, e.g. `"2.6.14"`.
    #[serde(default = "default_min_kernel_version")]
    pub min_kernel_version: String,

    /// Events buffered between the watcher and its consumer.
    #[serde(default = "default_output_capacity")]
    pub output_capacity: usize,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_read_buffer_size() -> usize {
    DEFAULT_READ_BUFFER_SIZE
}

fn default_move_cookie_ttl_ms() -> u64 {
    2000
}

fn default_max_pending_moves() -> usize {
    4096
}

fn default_min_kernel_version() -> String {
    KernelVersion::default().to_string()
}

fn default_output_capacity() -> usize {
    256
}

impl Default for WatcherSection {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            read_buffer_size: default_read_buffer_size(),
            move_cookie_ttl_ms: default_move_cookie_ttl_ms(),
            max_pending_moves: default_max_pending_moves(),
            min_kernel_version: default_min_kernel_version(),
            output_capacity: default_output_capacity(),
        }
    }
}

/// `[default]` section: policy for roots that do not override it.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DefaultSection {
    /// Requested event classes; empty means all.
    #[serde(default)]
    pub events: Vec<EventClass>,

    #[serde(default)]
    pub flags: Vec<FlagName>,

    #[serde(default)]
    pub include_hidden: bool,

    /// Glob patterns of directories never watched.
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// One `[[watch]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchRoot {
    pub path: PathBuf,

    /// If `None`, the root uses `default.events`.
    #[serde(default)]
    pub events: Option<Vec<EventClass>>,

    /// If `None`, the root uses `default.flags`.
    #[serde(default)]
    pub flags: Option<Vec<FlagName>>,

    #[serde(default)]
    pub include_hidden: Option<bool>,

    /// Appended to `default.exclude`.
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl WatchRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            events: None,
            flags: None,
            include_hidden: None,
            exclude: Vec::new(),
        }
    }
}

impl ConfigFile {
    /// Construct without validation. Prefer `ConfigFile::try_from`.
    pub fn new_unchecked(
        watcher: WatcherSection,
        default: DefaultSection,
        watch: Vec<WatchRoot>,
    ) -> Self {
        Self {
            watcher,
            default,
            watch,
        }
    }

    /// Engine options from `[watcher]`.
    pub fn watcher_options(&self) -> WatcherOptions {
        let w = &self.watcher;
        WatcherOptions {
            batch_size: w.batch_size,
            read_buffer_size: w.read_buffer_size,
            move_ttl: Duration::from_millis(w.move_cookie_ttl_ms),
            max_pending_moves: w.max_pending_moves,
            min_kernel_version: w
                .min_kernel_version
                .parse()
                .unwrap_or_default(),
            output_capacity: w.output_capacity,
        }
    }

    /// Effective policy for `root`, merged with `[default]`.
    pub fn policy_for(&self, root: &WatchRoot) -> Result<WatchPolicy> {
        let events = root.events.as_deref().unwrap_or(&self.default.events);
        let flags = root.flags.as_deref().unwrap_or(&self.default.flags);
        let include_hidden = root.include_hidden.unwrap_or(self.default.include_hidden);

        let mut exclude = self.default.exclude.clone();
        exclude.extend(root.exclude.iter().cloned());
        let filter: Arc<dyn WatchFilter> = if exclude.is_empty() {
            Arc::new(DefaultFilter)
        } else {
            Arc::new(GlobFilter::new(&exclude)?)
        };

        Ok(WatchPolicy::new(EventClass::combine(events))
            .with_flags(FlagName::combine(flags))
            .with_hidden(include_hidden)
            .with_filter(filter))
    }

    /// Every `[[watch]]` root with its effective policy.
    pub fn roots(&self) -> Result<Vec<(PathBuf, WatchPolicy)>> {
        self.watch
            .iter()
            .map(|root| Ok((root.path.clone(), self.policy_for(root)?)))
            .collect()
    }
}
