//! Owning socket transport
//!
//! `SocketTransport` wraps a [`Handle`] and closes it exactly once, either
//! through [`SocketTransport::close`] or on drop. All I/O takes `&self`, so a
//! transport can be shared with a scoped thread and [`shutdown`] used to wake
//! a read or write blocked there.
//!
//! [`shutdown`]: SocketTransport::shutdown

use super::chunked::{read_chunk, write_all_chunked};
use super::endpoint;
use super::syscall::{self, Handle};
use super::{IoOp, ReadOutcome, Result, TransportError};
use crate::config::TransportConfig;
use nix::errno::Errno;
use nix::sys::socket::Shutdown;
use std::io;
use std::num::NonZeroUsize;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::path::Path;
use std::thread;
use tracing::debug;

/// Connected (or connectable) Unix-domain stream socket
#[derive(Debug)]
pub struct SocketTransport {
    handle: Handle,
    chunk_size: NonZeroUsize,
}

impl SocketTransport {
    /// Open an unconnected socket using the configured chunk size
    pub fn open(config: &TransportConfig) -> Result<Self> {
        Ok(Self {
            handle: endpoint::open()?,
            chunk_size: config.chunk_size,
        })
    }

    pub fn connect(&self, path: impl AsRef<Path>) -> Result<()> {
        endpoint::connect(self.handle, path)
    }

    /// Open and connect in one step; the socket is closed if connect fails
    pub fn connect_to(path: impl AsRef<Path>, config: &TransportConfig) -> Result<Self> {
        let transport = Self::open(config)?;
        transport.connect(path)?;
        Ok(transport)
    }

    /// Connect, retrying while the socket path does not exist yet
    ///
    /// Only [`TransportError::NotFound`] is retried, up to
    /// `config.connect_attempts` attempts in total. Any other failure is
    /// returned immediately.
    pub fn connect_with_backoff(path: impl AsRef<Path>, config: &TransportConfig) -> Result<Self> {
        let path = path.as_ref();
        let mut attempt = 0;

        loop {
            attempt += 1;
            match Self::connect_to(path, config) {
                Err(TransportError::NotFound) if attempt < config.connect_attempts => {
                    let delay = config.backoff.delay(attempt);
                    debug!(
                        attempt,
                        ?delay,
                        path = %path.display(),
                        "socket not found, retrying"
                    );
                    thread::sleep(delay);
                }
                result => return result,
            }
        }
    }

    pub fn chunk_size(&self) -> NonZeroUsize {
        self.chunk_size
    }

    /// Read one chunk into `dst`; see [`endpoint::read`](super::read)
    pub fn read(&self, dst: &mut [u8]) -> Result<ReadOutcome> {
        read_chunk(&self.handle, dst, self.chunk_size)
    }

    /// Write all of `src`; see [`endpoint::write`](super::write)
    pub fn write(&self, src: &[u8]) -> Result<()> {
        write_all_chunked(&self.handle, src, self.chunk_size)
    }

    /// Stop sending; the peer sees end-of-stream but can still reply
    pub fn shutdown_write(&self) -> Result<()> {
        match syscall::shutdown(self.handle.as_raw_fd(), Shutdown::Write) {
            Ok(()) => Ok(()),
            Err(errno) => Err(TransportError::io(IoOp::Write, errno)),
        }
    }

    /// Shut down both directions without releasing the descriptor
    ///
    /// Safe to call from another thread while a read or write is blocked:
    /// a blocked read returns end-of-stream and a blocked write fails.
    pub fn shutdown(&self) {
        match syscall::shutdown(self.handle.as_raw_fd(), Shutdown::Both) {
            Ok(()) | Err(Errno::ENOTCONN) => {}
            Err(errno) => debug!(fd = self.handle.as_raw_fd(), %errno, "shutdown failed"),
        }
    }

    /// Shut down and release the socket
    pub fn close(self) {
        drop(self);
    }
}

impl Drop for SocketTransport {
    fn drop(&mut self) {
        endpoint::close(self.handle);
    }
}

/// Borrowing only; the descriptor is released by `close` or drop alone
impl AsFd for SocketTransport {
    fn as_fd(&self) -> BorrowedFd<'_> {
        // SAFETY: the descriptor stays open until `self` is dropped.
        unsafe { BorrowedFd::borrow_raw(self.handle.as_raw_fd()) }
    }
}

impl AsRawFd for SocketTransport {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

impl io::Read for &SocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        Ok(SocketTransport::read(*self, buf)?.bytes_read())
    }
}

impl io::Read for SocketTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(&mut &*self, buf)
    }
}

impl io::Write for &SocketTransport {
    /// Writes at most one chunk
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = buf.len().min(self.chunk_size.get());
        SocketTransport::write(*self, &buf[..n])?;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl io::Write for SocketTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::Write::write(&mut &*self, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
