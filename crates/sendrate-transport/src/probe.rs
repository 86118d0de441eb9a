//! # sendrate-transport: Kernel Backlog Probe
//!
//! One interface, two variants. Platform `cfg` stays inside `native`;
//! callers only ever see `PlatformProbe`.

use sendrate_core::BacklogProbe;
use std::io;
use std::os::fd::{AsFd, BorrowedFd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformProbe {
    /// Reads the outbound queue through the OS (`TIOCOUTQ` / `SO_NWRITE`).
    Native,
    /// No capability on this platform; every query reports 0.
    Unsupported,
}

impl PlatformProbe {
    /// Picks `Native` when the build target has an outbound-queue query.
    pub fn detect() -> Self {
        if native::SUPPORTED {
            PlatformProbe::Native
        } else {
            PlatformProbe::Unsupported
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, PlatformProbe::Native)
    }

    /// Raw query, errors included. `BacklogProbe` folds errors into 0.
    pub fn query(&self, fd: BorrowedFd<'_>) -> io::Result<u64> {
        match self {
            PlatformProbe::Native => native::outbound_queue(fd),
            PlatformProbe::Unsupported => Ok(0),
        }
    }
}

impl Default for PlatformProbe {
    fn default() -> Self {
        Self::detect()
    }
}

impl<S: AsFd + ?Sized> BacklogProbe<S> for PlatformProbe {
    fn unacknowledged_bytes(&self, socket: &S) -> u64 {
        match self.query(socket.as_fd()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::trace!("outbound queue query failed: {}", e);
                0
            }
        }
    }
}

#[cfg(any(target_os = "linux", target_os = "android"))]
mod native {
    use std::io;
    use std::os::fd::{AsRawFd, BorrowedFd};

    pub(super) const SUPPORTED: bool = true;

    // SIOCOUTQ shares its number with TIOCOUTQ: unsent plus unacknowledged bytes.
    nix::ioctl_read_bad!(siocoutq, nix::libc::TIOCOUTQ, nix::libc::c_int);

    pub(super) fn outbound_queue(fd: BorrowedFd<'_>) -> io::Result<u64> {
        let mut queued: nix::libc::c_int = 0;
        // # Safety: `fd` is borrowed for the duration of the call and `queued`
        // is a valid, writable c_int as the ioctl requires.
        unsafe { siocoutq(fd.as_raw_fd(), &mut queued) }.map_err(io::Error::from)?;
        Ok(queued.max(0) as u64)
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
mod native {
    use std::io;
    use std::os::fd::{AsRawFd, BorrowedFd};

    pub(super) const SUPPORTED: bool = true;

    pub(super) fn outbound_queue(fd: BorrowedFd<'_>) -> io::Result<u64> {
        let mut queued: libc::c_int = 0;
        let mut len = std::mem::size_of::<libc::c_int>() as libc::socklen_t;
        // # Safety: `queued` and `len` outlive the call and `len` matches the buffer size.
        let rc = unsafe {
            libc::getsockopt(
                fd.as_raw_fd(),
                libc::SOL_SOCKET,
                libc::SO_NWRITE,
                &mut queued as *mut libc::c_int as *mut libc::c_void,
                &mut len,
            )
        };
        if rc != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(queued.max(0) as u64)
    }
}

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "macos",
    target_os = "ios"
)))]
mod native {
    use std::io;
    use std::os::fd::BorrowedFd;

    pub(super) const SUPPORTED: bool = false;

    pub(super) fn outbound_queue(_fd: BorrowedFd<'_>) -> io::Result<u64> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "no outbound queue query on this platform"))
    }
}
