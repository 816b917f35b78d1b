//! Chunked read step and write loop
//!
//! Neither function moves more than one chunk through a single syscall.
//! A read is one step (callers loop); a write spans as many steps as the
//! source region needs and only returns once every byte is accepted.

use super::syscall::{RawSocket, retry_eintr};
use super::{IoOp, ReadOutcome, Result, TransportError};
use std::io;
use std::num::NonZeroUsize;
use tracing::trace;

/// Read at most `min(chunk, dst.len())` bytes into the front of `dst`
pub(crate) fn read_chunk<S>(sock: &S, dst: &mut [u8], chunk: NonZeroUsize) -> Result<ReadOutcome>
where
    S: RawSocket + ?Sized,
{
    if dst.is_empty() {
        return Err(TransportError::EmptyRegion);
    }

    let want = chunk.get().min(dst.len());
    let n = retry_eintr(|| sock.recv(&mut dst[..want]))
        .map_err(|errno| TransportError::io(IoOp::Read, errno))?;
    debug_assert!(n <= want, "recv reported more bytes than requested");
    trace!(requested = want, received = n, "read chunk");

    if n == 0 {
        Ok(ReadOutcome::EndOfStream)
    } else {
        Ok(ReadOutcome::Data(n))
    }
}

/// Write all of `src`, one chunk-sized syscall at a time
///
/// Bytes accepted before a failing step stay written; the error reports
/// only the step that failed.
pub(crate) fn write_all_chunked<S>(sock: &S, src: &[u8], chunk: NonZeroUsize) -> Result<()>
where
    S: RawSocket + ?Sized,
{
    let mut written = 0;
    let mut remaining = src.len();

    while remaining > 0 {
        debug_assert_eq!(written + remaining, src.len());

        let step = chunk.get().min(remaining);
        let n = retry_eintr(|| sock.send(&src[written..written + step]))
            .map_err(|errno| TransportError::io(IoOp::Write, errno))?;
        if n == 0 {
            return Err(TransportError::Io {
                op: IoOp::Write,
                source: io::Error::from(io::ErrorKind::WriteZero),
            });
        }
        debug_assert!(n <= step, "send reported more bytes than offered");
        trace!(offered = step, accepted = n, written, "write chunk");

        written += n;
        remaining -= n;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    /// What the scripted socket does on its next syscall
    #[derive(Debug, Clone)]
    pub(crate) enum Step {
        /// Deliver these bytes (truncated to the caller's buffer)
        Data(Vec<u8>),
        /// Accept up to this many bytes of a send
        Accept(usize),
        Fail(Errno),
        Eof,
    }

    /// A socket that replays a fixed script and records every syscall
    #[derive(Default)]
    pub(crate) struct ScriptedSocket {
        script: RefCell<VecDeque<Step>>,
        pub(crate) recv_sizes: RefCell<Vec<usize>>,
        pub(crate) sent: RefCell<Vec<Vec<u8>>>,
    }

    impl ScriptedSocket {
        pub(crate) fn new(script: impl IntoIterator<Item = Step>) -> Self {
            Self {
                script: RefCell::new(script.into_iter().collect()),
                ..Default::default()
            }
        }

        fn next_step(&self) -> Step {
            self.script
                .borrow_mut()
                .pop_front()
                .expect("script exhausted")
        }

        pub(crate) fn sent_bytes(&self) -> Vec<u8> {
            self.sent.borrow().concat()
        }
    }

    impl RawSocket for ScriptedSocket {
        fn recv(&self, buf: &mut [u8]) -> nix::Result<usize> {
            self.recv_sizes.borrow_mut().push(buf.len());
            match self.next_step() {
                Step::Data(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Step::Fail(errno) => Err(errno),
                Step::Eof => Ok(0),
                Step::Accept(_) => panic!("send step scripted for recv"),
            }
        }

        fn send(&self, buf: &[u8]) -> nix::Result<usize> {
            match self.next_step() {
                Step::Accept(limit) => {
                    let n = limit.min(buf.len());
                    self.sent.borrow_mut().push(buf[..n].to_vec());
                    Ok(n)
                }
                Step::Fail(errno) => Err(errno),
                other => panic!("recv step {:?} scripted for send", other),
            }
        }
    }

    fn chunk(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn test_write_spans_chunks() {
        let data = pattern(300);
        let sock = ScriptedSocket::new([
            Step::Accept(usize::MAX),
            Step::Accept(usize::MAX),
            Step::Accept(usize::MAX),
        ]);

        write_all_chunked(&sock, &data, chunk(128)).unwrap();

        let sizes: Vec<usize> = sock.sent.borrow().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![128, 128, 44]);
        assert_eq!(sock.sent_bytes(), data);
    }

    #[test]
    fn test_write_one_past_chunk() {
        let data = pattern(129);
        let sock = ScriptedSocket::new([Step::Accept(usize::MAX), Step::Accept(usize::MAX)]);

        write_all_chunked(&sock, &data, chunk(128)).unwrap();

        let sizes: Vec<usize> = sock.sent.borrow().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![128, 1]);
    }

    #[test]
    fn test_write_advances_by_accepted_count() {
        let data = pattern(100);
        let sock = ScriptedSocket::new([
            Step::Accept(30),
            Step::Accept(usize::MAX),
            Step::Accept(5),
            Step::Accept(usize::MAX),
        ]);

        write_all_chunked(&sock, &data, chunk(64)).unwrap();

        let sizes: Vec<usize> = sock.sent.borrow().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![30, 64, 5, 1]);
        assert_eq!(sock.sent_bytes(), data);
    }

    #[test]
    fn test_write_retries_eintr_without_duplicating() {
        let data = pattern(200);
        let sock = ScriptedSocket::new([
            Step::Accept(usize::MAX),
            Step::Fail(Errno::EINTR),
            Step::Fail(Errno::EINTR),
            Step::Accept(usize::MAX),
        ]);

        write_all_chunked(&sock, &data, chunk(128)).unwrap();

        assert_eq!(sock.sent_bytes(), data);
    }

    #[test]
    fn test_write_error_after_partial_progress() {
        let data = pattern(300);
        let sock = ScriptedSocket::new([Step::Accept(usize::MAX), Step::Fail(Errno::EPIPE)]);

        let err = write_all_chunked(&sock, &data, chunk(128)).unwrap_err();

        match err {
            TransportError::Io { op, source } => {
                assert_eq!(op, IoOp::Write);
                assert_eq!(source.raw_os_error(), Some(Errno::EPIPE as i32));
            }
            other => panic!("expected Io error, got {:?}", other),
        }
        assert_eq!(sock.sent_bytes(), data[..128].to_vec());
    }

    #[test]
    fn test_write_zero_is_an_error() {
        let sock = ScriptedSocket::new([Step::Accept(0)]);

        let err = write_all_chunked(&sock, b"hello", chunk(128)).unwrap_err();

        match err {
            TransportError::Io { op, source } => {
                assert_eq!(op, IoOp::Write);
                assert_eq!(source.kind(), io::ErrorKind::WriteZero);
            }
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_write_empty_source_skips_syscalls() {
        let sock = ScriptedSocket::new(Vec::<Step>::new());
        write_all_chunked(&sock, &[], chunk(128)).unwrap();
        assert!(sock.sent.borrow().is_empty());
    }

    #[test]
    fn test_read_bounded_by_destination() {
        let sock = ScriptedSocket::new([Step::Data(pattern(300))]);
        let mut dst = [0u8; 50];

        let outcome = read_chunk(&sock, &mut dst, chunk(128)).unwrap();

        assert_eq!(outcome, ReadOutcome::Data(50));
        assert_eq!(sock.recv_sizes.borrow().as_slice(), &[50]);
        assert_eq!(dst.to_vec(), pattern(50));
    }

    #[test]
    fn test_read_bounded_by_chunk() {
        let sock = ScriptedSocket::new([Step::Data(pattern(300))]);
        let mut dst = [0u8; 1000];

        let outcome = read_chunk(&sock, &mut dst, chunk(128)).unwrap();

        assert_eq!(outcome, ReadOutcome::Data(128));
        assert_eq!(sock.recv_sizes.borrow().as_slice(), &[128]);
    }

    #[test]
    fn test_read_retries_eintr() {
        let sock = ScriptedSocket::new([
            Step::Fail(Errno::EINTR),
            Step::Fail(Errno::EINTR),
            Step::Data(b"abc".to_vec()),
        ]);
        let mut dst = [0u8; 16];

        let outcome = read_chunk(&sock, &mut dst, chunk(128)).unwrap();

        assert_eq!(outcome, ReadOutcome::Data(3));
        assert_eq!(&dst[..3], b"abc");
        assert_eq!(sock.recv_sizes.borrow().len(), 3);
    }

    #[test]
    fn test_read_zero_is_end_of_stream() {
        let sock = ScriptedSocket::new([Step::Eof]);
        let mut dst = [0u8; 16];

        let outcome = read_chunk(&sock, &mut dst, chunk(128)).unwrap();

        assert_eq!(outcome, ReadOutcome::EndOfStream);
    }

    #[test]
    fn test_read_error_is_io_read() {
        let sock = ScriptedSocket::new([Step::Fail(Errno::ECONNRESET)]);
        let mut dst = [0u8; 16];

        let err = read_chunk(&sock, &mut dst, chunk(128)).unwrap_err();

        match err {
            TransportError::Io { op, source } => {
                assert_eq!(op, IoOp::Read);
                assert_eq!(source.raw_os_error(), Some(Errno::ECONNRESET as i32));
            }
            other => panic!("expected Io error, got {:?}", other),
        }
    }

    #[test]
    fn test_read_empty_region_is_rejected() {
        let sock = ScriptedSocket::new(Vec::<Step>::new());
        let mut dst = [0u8; 0];

        let err = read_chunk(&sock, &mut dst, chunk(128)).unwrap_err();

        assert!(matches!(err, TransportError::EmptyRegion));
        assert!(sock.recv_sizes.borrow().is_empty());
    }
}
