// src/watch/decoder.rs

//! Decoding of the byte stream read from the inotify descriptor.
//!
//! One `read` returns zero or more records laid out back to back:
//!
//! ```text
//! +--------+--------+--------+--------+------------------------+
//! | wd i32 | mask   | cookie | len    | name: `len` bytes,     |
//! |        | u32    | u32    | u32    | NUL padded             |
//! +--------+--------+--------+--------+------------------------+
//! ```
//!
//! All header fields are in native byte order. The decoder walks the slice
//! with explicit bounds checks and never reinterprets memory as a struct.

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use tracing::debug;

use crate::kernel::{EventMask, WatchHandle};

/// Size of the fixed record header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Longest name the kernel reports (`NAME_MAX`), not counting the NUL.
pub const NAME_MAX: usize = 255;

/// One decoded record, before any path resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub handle: WatchHandle,
    pub mask: EventMask,
    /// Correlates `MOVED_FROM`/`MOVED_TO` pairs; 0 when not part of a move.
    pub cookie: u32,
    /// Name relative to the watched directory; empty for events on the
    /// watched object itself.
    pub name: OsString,
}

impl RawEvent {
    pub fn new(handle: WatchHandle, mask: EventMask, cookie: u32, name: impl AsRef<OsStr>) -> Self {
        Self {
            handle,
            mask,
            cookie,
            name: name.as_ref().to_os_string(),
        }
    }

    /// Append this event to `out` in the kernel's wire layout.
    ///
    /// Names are NUL terminated and padded to a multiple of the header size,
    /// the way the kernel pads them.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        let name = self.name.as_bytes();
        let len = if name.is_empty() {
            0
        } else {
            (name.len() + 1).div_ceil(HEADER_SIZE) * HEADER_SIZE
        };

        out.extend_from_slice(&self.handle.as_raw().to_ne_bytes());
        out.extend_from_slice(&self.mask.bits().to_ne_bytes());
        out.extend_from_slice(&self.cookie.to_ne_bytes());
        out.extend_from_slice(&(len as u32).to_ne_bytes());
        out.extend_from_slice(name);
        out.resize(out.len() + len - name.len(), 0);
    }
}

/// Decode every complete record in `buf`.
///
/// Never fails: a tail that is shorter than a header, or whose name length
/// runs past the end of the buffer, is dropped and logged. Records before
/// the bad tail are still returned.
pub fn decode(buf: &[u8]) -> Vec<RawEvent> {
    let mut events = Vec::new();
    let mut pos = 0;

    while pos < buf.len() {
        let remaining = buf.len() - pos;
        if remaining < HEADER_SIZE {
            debug!(
                offset = pos,
                remaining,
                "dropping trailing bytes shorter than an event header"
            );
            break;
        }

        let header = &buf[pos..pos + HEADER_SIZE];
        let wd = i32::from_ne_bytes(field(header, 0));
        let mask = u32::from_ne_bytes(field(header, 4));
        let cookie = u32::from_ne_bytes(field(header, 8));
        let len = u32::from_ne_bytes(field(header, 12)) as usize;

        let name_start = pos + HEADER_SIZE;
        let Some(name_end) = name_start.checked_add(len).filter(|end| *end <= buf.len()) else {
            debug!(
                offset = pos,
                name_len = len,
                available = buf.len() - name_start,
                "dropping record whose name runs past the end of the buffer"
            );
            break;
        };

        let raw_name = &buf[name_start..name_end];
        let name = match raw_name.iter().position(|b| *b == 0) {
            Some(nul) => &raw_name[..nul],
            None => raw_name,
        };

        events.push(RawEvent {
            handle: WatchHandle::from_raw(wd),
            mask: EventMask::from_bits_retain(mask),
            cookie,
            name: OsStr::from_bytes(name).to_os_string(),
        });

        pos = name_end;
    }

    events
}

fn field(header: &[u8], offset: usize) -> [u8; 4] {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&header[offset..offset + 4]);
    bytes
}
