//! Transport layer for Unix-domain stream sockets
//!
//! This module provides a blocking, chunked client transport over a raw
//! socket descriptor. It is organized into:
//! - `syscall`: the OS boundary (descriptor handle, EINTR retry, addressing)
//! - `chunked`: the single-chunk read step and the multi-chunk write loop
//! - `endpoint`: free functions over a caller-owned `Handle`
//! - `sync_transport`: an owning `SocketTransport` that closes on drop

use std::fmt;
use std::io;
use std::num::NonZeroUsize;
use thiserror::Error;

mod chunked;
mod endpoint;
mod sync_transport;
mod syscall;

pub use endpoint::{close, connect, open, read, read_with_chunk, write, write_with_chunk};
pub use sync_transport::SocketTransport;
pub use syscall::{Handle, sun_path_capacity};

/// Maximum number of bytes moved to or from the OS in one syscall
pub const DEFAULT_CHUNK_SIZE: NonZeroUsize = match NonZeroUsize::new(4096) {
    Some(size) => size,
    None => unreachable!(),
};

pub type Result<T> = std::result::Result<T, TransportError>;

/// Which step of connection establishment failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOp {
    Socket,
    Connect,
}

impl fmt::Display for ConnectOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectOp::Socket => f.write_str("socket"),
            ConnectOp::Connect => f.write_str("connect"),
        }
    }
}

/// Which transfer direction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoOp {
    Read,
    Write,
}

impl fmt::Display for IoOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IoOp::Read => f.write_str("read"),
            IoOp::Write => f.write_str("write"),
        }
    }
}

/// Transport error types
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{op}: {source}")]
    Connection {
        op: ConnectOp,
        #[source]
        source: io::Error,
    },
    #[error("socket path not found")]
    NotFound,
    #[error("{op}: {source}")]
    Io {
        op: IoOp,
        #[source]
        source: io::Error,
    },
    #[error("socket path is {len} bytes, the limit is {max}")]
    PathTooLong { len: usize, max: usize },
    #[error("socket path must be non-empty and free of NUL bytes")]
    InvalidPath,
    #[error("destination region has no remaining capacity")]
    EmptyRegion,
}

impl TransportError {
    pub(crate) fn connection(op: ConnectOp, errno: nix::errno::Errno) -> Self {
        TransportError::Connection {
            op,
            source: errno.into(),
        }
    }

    pub(crate) fn io(op: IoOp, errno: nix::errno::Errno) -> Self {
        TransportError::Io {
            op,
            source: errno.into(),
        }
    }

    /// True when the error means the endpoint does not exist (yet)
    pub fn is_not_found(&self) -> bool {
        matches!(self, TransportError::NotFound)
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Connection { source, .. } | TransportError::Io { source, .. } => source,
            TransportError::NotFound => io::Error::from(io::ErrorKind::NotFound),
            other @ (TransportError::PathTooLong { .. }
            | TransportError::InvalidPath
            | TransportError::EmptyRegion) => io::Error::new(io::ErrorKind::InvalidInput, other),
        }
    }
}

/// Result of a single chunked read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// This many bytes (never zero) were placed at the front of the region
    Data(usize),
    /// The peer closed its sending direction
    EndOfStream,
}

impl ReadOutcome {
    /// Bytes read, with end-of-stream counted as zero
    pub fn bytes_read(self) -> usize {
        match self {
            ReadOutcome::Data(n) => n,
            ReadOutcome::EndOfStream => 0,
        }
    }

    pub fn is_end_of_stream(self) -> bool {
        matches!(self, ReadOutcome::EndOfStream)
    }
}
