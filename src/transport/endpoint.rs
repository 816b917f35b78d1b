//! Caller-facing operations over a raw [`Handle`]
//!
//! The expected call sequence is `open` → `connect` → (`read`/`write`)* →
//! `close`. The caller owns the handle and must not use it after `close`.

use super::chunked::{read_chunk, write_all_chunked};
use super::syscall::{self, Handle, retry_eintr};
use super::{ConnectOp, DEFAULT_CHUNK_SIZE, ReadOutcome, Result, TransportError};
use nix::errno::Errno;
use nix::sys::socket::Shutdown;
use std::num::NonZeroUsize;
use std::os::fd::{AsRawFd, IntoRawFd};
use std::path::Path;
use tracing::{debug, warn};

/// Create an unconnected Unix-domain stream socket
pub fn open() -> Result<Handle> {
    let fd = syscall::stream_socket()
        .map_err(|errno| TransportError::connection(ConnectOp::Socket, errno))?;
    let handle = Handle::from_owned(fd);
    debug!(fd = handle.as_raw_fd(), "opened socket");
    Ok(handle)
}

/// Connect `handle` to the socket bound at `path`
///
/// Fails with [`TransportError::NotFound`] when nothing exists at `path`,
/// so callers can tell a missing endpoint apart from a refused one.
pub fn connect(handle: Handle, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let addr = syscall::unix_addr(path)?;

    match syscall::connect_addr(handle.as_raw_fd(), &addr) {
        Ok(()) => {
            debug!(fd = handle.as_raw_fd(), path = %path.display(), "connected");
            Ok(())
        }
        Err(Errno::ENOENT) => {
            debug!(path = %path.display(), "socket path does not exist");
            Err(TransportError::NotFound)
        }
        Err(errno) => Err(TransportError::connection(ConnectOp::Connect, errno)),
    }
}

/// Shut down both directions and release the descriptor
///
/// Teardown is best effort and never reports failure. Shutting down first
/// wakes any read or write blocked on this handle in another thread.
pub fn close(handle: Handle) {
    let fd = handle.into_raw_fd();

    match syscall::shutdown(fd, Shutdown::Both) {
        Ok(()) | Err(Errno::ENOTCONN) => {}
        Err(errno) => debug!(fd, %errno, "shutdown before close failed"),
    }

    // Linux releases the descriptor even when close reports EINTR, so a
    // retry there could close a descriptor another thread just opened.
    let result = if cfg!(any(target_os = "linux", target_os = "android")) {
        syscall::close_fd(fd)
    } else {
        retry_eintr(|| syscall::close_fd(fd))
    };

    match result {
        Ok(()) | Err(Errno::EINTR) => debug!(fd, "closed socket"),
        Err(errno) => warn!(fd, %errno, "close failed"),
    }
}

/// Read one chunk of at most [`DEFAULT_CHUNK_SIZE`] bytes into `dst`
///
/// `dst` is the destination region (the caller's buffer sliced from its
/// offset); its length is the remaining capacity.
pub fn read(handle: Handle, dst: &mut [u8]) -> Result<ReadOutcome> {
    read_chunk(&handle, dst, DEFAULT_CHUNK_SIZE)
}

/// Read one chunk of at most `min(chunk, dst.len())` bytes into `dst`
pub fn read_with_chunk(handle: Handle, dst: &mut [u8], chunk: NonZeroUsize) -> Result<ReadOutcome> {
    read_chunk(&handle, dst, chunk)
}

/// Write all of `src`, [`DEFAULT_CHUNK_SIZE`] bytes per syscall at most
pub fn write(handle: Handle, src: &[u8]) -> Result<()> {
    write_all_chunked(&handle, src, DEFAULT_CHUNK_SIZE)
}

/// Write all of `src`, `chunk` bytes per syscall at most
pub fn write_with_chunk(handle: Handle, src: &[u8], chunk: NonZeroUsize) -> Result<()> {
    write_all_chunked(&handle, src, chunk)
}
