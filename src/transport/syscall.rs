//! OS boundary for the socket transport
//!
//! Everything that touches a raw descriptor lives here. The rest of the
//! transport sees a socket only through [`RawSocket`], which keeps the
//! chunking logic testable without a kernel on the other end.

use super::{ConnectOp, Result, TransportError};
use nix::errno::Errno;
use nix::libc;
use nix::sys::socket::{self, AddressFamily, MsgFlags, SockFlag, SockType, UnixAddr};
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use tracing::trace;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: MsgFlags = MsgFlags::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: MsgFlags = MsgFlags::empty();

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
const SOCKET_FLAGS: SockFlag = SockFlag::SOCK_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
const SOCKET_FLAGS: SockFlag = SockFlag::empty();

/// Opaque, caller-owned identifier for an open socket
///
/// A `Handle` is `Copy` so it can be handed to another thread for the one
/// sanctioned cross-thread call (`close`/shutdown to unblock a pending
/// read or write). It does not close itself; see [`SocketTransport`] for an
/// owning wrapper.
///
/// [`SocketTransport`]: super::SocketTransport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(RawFd);

impl Handle {
    pub(crate) fn from_owned(fd: OwnedFd) -> Self {
        Handle(fd.into_raw_fd())
    }
}

impl AsRawFd for Handle {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

impl IntoRawFd for Handle {
    fn into_raw_fd(self) -> RawFd {
        self.0
    }
}

impl FromRawFd for Handle {
    /// # Safety
    ///
    /// `fd` must be an open stream socket that the caller owns.
    unsafe fn from_raw_fd(fd: RawFd) -> Self {
        Handle(fd)
    }
}

/// The two data-moving syscalls the chunked loops are written against
pub(crate) trait RawSocket {
    /// One OS read into `buf`; `Ok(0)` means the peer closed its side
    fn recv(&self, buf: &mut [u8]) -> nix::Result<usize>;

    /// One OS write of `buf`; may accept fewer bytes than offered
    fn send(&self, buf: &[u8]) -> nix::Result<usize>;
}

impl RawSocket for Handle {
    fn recv(&self, buf: &mut [u8]) -> nix::Result<usize> {
        socket::recv(self.0, buf, MsgFlags::empty())
    }

    fn send(&self, buf: &[u8]) -> nix::Result<usize> {
        socket::send(self.0, buf, SEND_FLAGS)
    }
}

/// Run `op` until it returns anything other than `EINTR`
pub(crate) fn retry_eintr<T>(mut op: impl FnMut() -> nix::Result<T>) -> nix::Result<T> {
    loop {
        match op() {
            Err(Errno::EINTR) => trace!("syscall interrupted, retrying"),
            other => return other,
        }
    }
}

pub(crate) fn stream_socket() -> nix::Result<OwnedFd> {
    socket::socket(AddressFamily::Unix, SockType::Stream, SOCKET_FLAGS, None)
}

pub(crate) fn connect_addr(fd: RawFd, addr: &UnixAddr) -> nix::Result<()> {
    socket::connect(fd, addr)
}

pub(crate) fn shutdown(fd: RawFd, how: socket::Shutdown) -> nix::Result<()> {
    socket::shutdown(fd, how)
}

/// Release `fd`; the caller must not use it again whatever the outcome
pub(crate) fn close_fd(fd: RawFd) -> nix::Result<()> {
    // SAFETY: ownership of `fd` ends here; no Rust object wraps it.
    Errno::result(unsafe { libc::close(fd) }).map(drop)
}

/// Size of the platform's `sun_path` field, terminator included
pub fn sun_path_capacity() -> usize {
    // SAFETY: sockaddr_un is plain old data and all-zero is a valid value.
    let addr: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    addr.sun_path.len()
}

/// Build a filesystem-path address, rejecting paths that cannot be stored
/// NUL-terminated in `sun_path`
pub(crate) fn unix_addr(path: &Path) -> Result<UnixAddr> {
    let bytes = path.as_os_str().as_bytes();
    if bytes.is_empty() || bytes.contains(&0) {
        return Err(TransportError::InvalidPath);
    }

    let max = sun_path_capacity() - 1;
    if bytes.len() > max {
        return Err(TransportError::PathTooLong {
            len: bytes.len(),
            max,
        });
    }

    UnixAddr::new(path).map_err(|errno| TransportError::connection(ConnectOp::Connect, errno))
}
