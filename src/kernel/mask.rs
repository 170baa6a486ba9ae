// src/kernel/mask.rs

//! Bit values of the inotify event mask.
//!
//! The numeric values match `<sys/inotify.h>` on Linux. They are spelled out
//! here rather than taken from `libc`, so the decoder and the fake kernel
//! do not depend on the Linux-only inotify bindings.

use bitflags::bitflags;

bitflags! {
    /// Event classes and kernel bookkeeping bits carried by a raw record.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventMask: u32 {
        const ACCESS = 0x0000_0001;
        const MODIFY = 0x0000_0002;
        const ATTRIB = 0x0000_0004;
        const CLOSE_WRITE = 0x0000_0008;
        const CLOSE_NOWRITE = 0x0000_0010;
        const OPEN = 0x0000_0020;
        const MOVED_FROM = 0x0000_0040;
        const MOVED_TO = 0x0000_0080;
        const CREATE = 0x0000_0100;
        const DELETE = 0x0000_0200;
        const DELETE_SELF = 0x0000_0400;
        const MOVE_SELF = 0x0000_0800;

        /// Backing filesystem was unmounted. Always requested.
        const UNMOUNT = 0x0000_2000;
        /// The kernel event queue overflowed; the record has handle -1.
        const Q_OVERFLOW = 0x0000_4000;
        /// The watch was removed, explicitly or by the kernel.
        const IGNORED = 0x0000_8000;
        /// Modifier: the subject of the event is a directory.
        const ISDIR = 0x4000_0000;

        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
        const MOVE = Self::MOVED_FROM.bits() | Self::MOVED_TO.bits();
        const ALL_EVENTS = Self::ACCESS.bits()
            | Self::MODIFY.bits()
            | Self::ATTRIB.bits()
            | Self::CLOSE_WRITE.bits()
            | Self::CLOSE_NOWRITE.bits()
            | Self::OPEN.bits()
            | Self::MOVED_FROM.bits()
            | Self::MOVED_TO.bits()
            | Self::CREATE.bits()
            | Self::DELETE.bits()
            | Self::DELETE_SELF.bits()
            | Self::MOVE_SELF.bits();
    }
}

bitflags! {
    /// Per-watch flags passed to `inotify_add_watch` alongside the classes.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct WatchFlags: u32 {
        const ONLY_DIR = 0x0100_0000;
        const DONT_FOLLOW = 0x0200_0000;
        const EXCL_UNLINK = 0x0400_0000;
        const MASK_ADD = 0x2000_0000;
        const ONESHOT = 0x8000_0000;
    }
}

/// Build the final mask handed to the kernel for one watch.
///
/// `UNMOUNT` is always included so every watch can report volume removal.
pub fn kernel_mask(events: EventMask, flags: WatchFlags) -> u32 {
    (events | EventMask::UNMOUNT).bits() | flags.bits()
}
