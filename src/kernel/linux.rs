// src/kernel/linux.rs

//! Real inotify backend built on raw `libc` calls.

use std::ffi::{CStr, CString};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use tracing::debug;

use super::{Kernel, KernelVersion, WatchHandle};

/// An open inotify instance.
///
/// The descriptor is non-blocking and close-on-exec; it is closed when the
/// value is dropped.
#[derive(Debug)]
pub struct LinuxKernel {
    fd: OwnedFd,
}

impl LinuxKernel {
    /// Open a new inotify instance.
    pub fn open() -> io::Result<Self> {
        // SAFETY: no pointers are passed; the result is checked below.
        let fd = unsafe { libc::inotify_init1(libc::IN_NONBLOCK | libc::IN_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        debug!(fd, "opened inotify instance");
        // SAFETY: `fd` was just returned by `inotify_init1` and is owned by nobody else.
        let fd = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Self { fd })
    }
}

impl Kernel for LinuxKernel {
    fn add_watch(&mut self, path: &Path, mask: u32) -> io::Result<WatchHandle> {
        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        // SAFETY: `c_path` is a NUL-terminated string that outlives the call.
        let wd = unsafe { libc::inotify_add_watch(self.fd.as_raw_fd(), c_path.as_ptr(), mask) };
        if wd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(WatchHandle::from_raw(wd))
    }

    fn remove_watch(&mut self, handle: WatchHandle) -> io::Result<()> {
        // SAFETY: plain integer arguments; a stale handle only yields EINVAL.
        let res = unsafe { libc::inotify_rm_watch(self.fd.as_raw_fd(), handle.as_raw()) };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    fn read_raw(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // SAFETY: the pointer and length describe `buf`, which is exclusively borrowed.
        let res = unsafe {
            libc::read(
                self.fd.as_raw_fd(),
                buf.as_mut_ptr() as *mut libc::c_void,
                buf.len(),
            )
        };
        if res < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(res as usize)
    }

    fn version_at_least(&self, min: KernelVersion) -> bool {
        match running_kernel_version() {
            Some(version) => {
                if version < min {
                    debug!(%version, %min, "kernel too old for inotify");
                }
                version >= min
            }
            None => false,
        }
    }

    fn raw_fd(&self) -> Option<RawFd> {
        Some(self.fd.as_raw_fd())
    }
}

/// Release of the running kernel, as reported by `uname(2)`.
fn running_kernel_version() -> Option<KernelVersion> {
    // SAFETY: `utsname` is plain C data, all-zero is a valid value.
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    // SAFETY: `uts` is a valid, writable `utsname`.
    if unsafe { libc::uname(&mut uts) } < 0 {
        debug!(error = %io::Error::last_os_error(), "uname failed");
        return None;
    }
    // SAFETY: uname NUL-terminates every field it fills in.
    let release = unsafe { CStr::from_ptr(uts.release.as_ptr()) };
    KernelVersion::parse_release(&release.to_string_lossy())
}
