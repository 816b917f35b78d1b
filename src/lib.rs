//! Chunked, interrupt-safe client transport for Unix-domain stream sockets
//!
//! The transport is used in the order `open` → `connect` → (`read`/`write`)*
//! → `close`, either through the free functions in [`transport`] over a raw
//! [`Handle`] or through the owning [`SocketTransport`].

pub mod config;
pub mod transport;

pub use config::{Backoff, DEFAULT_SOCKET_PATH, TransportConfig, expand_socket_path};
pub use transport::{
    ConnectOp, DEFAULT_CHUNK_SIZE, Handle, IoOp, ReadOutcome, SocketTransport, TransportError,
};
