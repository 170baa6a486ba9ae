// src/kernel/mod.rs

//! Boundary to the kernel notification facility.
//!
//! The rest of the crate only talks to inotify through the [`Kernel`] trait:
//! production code uses [`LinuxKernel`], tests use [`fake::FakeKernel`],
//! which records watches in memory and hands back pre-encoded records.

use std::fmt;
use std::io;
use std::os::fd::RawFd;
use std::path::Path;
use std::str::FromStr;

pub mod fake;
#[cfg(target_os = "linux")]
pub mod linux;
pub mod mask;

#[cfg(target_os = "linux")]
pub use linux::LinuxKernel;
pub use mask::{kernel_mask, EventMask, WatchFlags};

/// Opaque identifier the kernel returns for an installed watch.
///
/// Only meaningful while the watch is active; the kernel may hand the same
/// number out again after the watch is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchHandle(i32);

impl WatchHandle {
    pub fn from_raw(wd: i32) -> Self {
        Self(wd)
    }

    pub fn as_raw(self) -> i32 {
        self.0
    }
}

impl fmt::Display for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wd{}", self.0)
    }
}

/// Minimal kernel release (`major.minor.patch`) required by the watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl KernelVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parse a kernel release string such as `"6.8.0-45-generic"`.
    ///
    /// Each component only contributes its leading digits; a missing patch
    /// level counts as 0. Returns `None` when major or minor are absent.
    pub fn parse_release(release: &str) -> Option<Self> {
        let mut parts = release.trim().split('.');
        let major = leading_number(parts.next()?)?;
        let minor = leading_number(parts.next()?)?;
        let patch = parts.next().and_then(leading_number).unwrap_or(0);
        Some(Self::new(major, minor, patch))
    }
}

impl Default for KernelVersion {
    /// inotify as we use it needs at least Linux 2.6.14.
    fn default() -> Self {
        Self::new(2, 6, 14)
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for KernelVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_release(s).ok_or_else(|| {
            format!("invalid kernel version: {s:?} (expected \"major.minor[.patch]\")")
        })
    }
}

fn leading_number(part: &str) -> Option<u32> {
    let end = part
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(part.len());
    part[..end].parse().ok()
}

/// Operations the watcher needs from the kernel notification API.
pub trait Kernel: Send + fmt::Debug {
    /// Install (or update) a watch on `path` with the raw kernel `mask`.
    fn add_watch(&mut self, path: &Path, mask: u32) -> io::Result<WatchHandle>;

    /// Remove a watch. Fails with `EINVAL` if the kernel already dropped it.
    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()>;

    /// Read pending records into `buf`.
    ///
    /// Returns `ErrorKind::WouldBlock` when nothing is queued.
    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Whether the running kernel is at least `min`.
    fn version_at_least(&self, min: KernelVersion) -> bool;

    /// Descriptor to register with an event loop, if there is one.
    fn raw_fd(&self) -> Option<RawFd>;
}
