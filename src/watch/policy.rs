// src/watch/policy.rs

use std::fmt;
use std::sync::Arc;

use crate::kernel::{EventMask, WatchFlags};
use crate::watch::filter::{DefaultFilter, WatchFilter};

/// Per-root watch configuration.
///
/// Set by `add_watch` and carried by every pending queue entry and every
/// installed watch under that root, so directories created later inherit
/// the policy of the tree they appear in.
#[derive(Clone)]
pub struct WatchPolicy {
    /// Event classes requested from the kernel.
    pub events: EventMask,
    pub flags: WatchFlags,
    /// Descend into directories whose name starts with `.`.
    pub include_hidden: bool,
    pub filter: Arc<dyn WatchFilter>,
}

impl WatchPolicy {
    pub fn new(events: EventMask) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn with_flags(mut self, flags: WatchFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_hidden(mut self, include_hidden: bool) -> Self {
        self.include_hidden = include_hidden;
        self
    }

    pub fn with_filter(mut self, filter: Arc<dyn WatchFilter>) -> Self {
        self.filter = filter;
        self
    }
}

impl Default for WatchPolicy {
    fn default() -> Self {
        Self {
            events: EventMask::ALL_EVENTS,
            flags: WatchFlags::empty(),
            include_hidden: false,
            filter: Arc::new(DefaultFilter),
        }
    }
}

impl fmt::Debug for WatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchPolicy")
            .field("events", &self.events)
            .field("flags", &self.flags)
            .field("include_hidden", &self.include_hidden)
            .field("filter", &self.filter)
            .finish()
    }
}
