// src/engine/mod.rs

//! Watcher engine.
//!
//! This module ties together:
//! - the synchronous facade ([`KInotify`]) owning the kernel handle and
//!   all watch bookkeeping
//! - the per-record event handlers
//! - the drain scheduler hook that keeps recursive installs cooperative
//! - the tokio event loop that reacts to:
//!   - readability of the inotify descriptor
//!   - drain requests
//!   - commands from a [`WatcherHandle`]
//!   - the stale-rename eviction tick
//!
//! The pure core lives in [`facade`]; the async/IO shell is implemented in
//! [`runtime`].

use std::time::Duration;

use crate::kernel::KernelVersion;
use crate::watch::event::WatchEvent;
use crate::watch::installer::DEFAULT_BATCH_SIZE;

/// Default size of the buffer handed to each kernel read.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 16 + 16 * 1024;

/// Tuning knobs shared by the core and the async shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Directories installed per scheduling turn.
    pub batch_size: usize,
    pub read_buffer_size: usize,
    /// How long a rename source waits for its destination.
    pub move_ttl: Duration,
    pub max_pending_moves: usize,
    pub min_kernel_version: KernelVersion,
    /// Capacity of the output channel of the async shell.
    pub output_capacity: usize,
}

impl Default for WatcherOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            move_ttl: Duration::from_secs(2),
            max_pending_moves: 4096,
            min_kernel_version: KernelVersion::default(),
            output_capacity: 256,
        }
    }
}

/// What the async shell publishes to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatcherOutput {
    Event(WatchEvent),
    /// The kernel's watch ceiling was hit. Sent at most once per process.
    WatchLimitReached,
}

pub mod event_handlers;
pub mod facade;
#[cfg(target_os = "linux")]
pub mod runtime;
pub mod scheduler;

pub use facade::{KInotify, ReadStep};
#[cfg(target_os = "linux")]
pub use runtime::{serve, spawn_watcher, WatcherHandle};
pub use scheduler::{ChannelScheduler, DrainScheduler, ManualScheduler};
