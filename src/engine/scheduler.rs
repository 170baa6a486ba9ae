// src/engine/scheduler.rs

//! Hook used by the facade to ask its owner for another install batch.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::trace;

/// Something that will, eventually, call `KInotify::drain_pending` again.
///
/// The facade never drains more than one batch per call; it asks the
/// scheduler for the next turn instead, so the owner's event loop gets
/// control back between batches.
pub trait DrainScheduler: Send + fmt::Debug {
    fn schedule_drain(&mut self);
}

/// Posts a drain request onto the owning task's channel.
#[derive(Debug, Clone)]
pub struct ChannelScheduler {
    tx: mpsc::UnboundedSender<()>,
}

impl ChannelScheduler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl DrainScheduler for ChannelScheduler {
    fn schedule_drain(&mut self) {
        if self.tx.send(()).is_err() {
            trace!("drain requested after the watcher loop stopped");
        }
    }
}

/// Counts requests and does nothing else; the owner drains by hand.
///
/// Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    requests: Arc<AtomicUsize>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of drain requests so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl DrainScheduler for ManualScheduler {
    fn schedule_drain(&mut self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}
