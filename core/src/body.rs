//! Blocking reader over the host's pull-based chunk source.
//!
//! # Design
//! `StreamBody` keeps the bytes of the last pulled chunk that the caller has
//! not consumed yet (`pending`). A read is served from `pending` when it is
//! non-empty; otherwise it pulls and parks the calling thread on a
//! capacity-one channel until the host settles that pull. Empty chunks are
//! skipped because `Ok(0)` means end of stream, so one read may pull more
//! than once before it returns data, end of stream, or an error.
//!
//! `close` forwards a cancel to the source without waiting for it to take
//! effect, so it is safe to call from cleanup paths. A pull already in
//! flight on the host side may still settle after the cancel.

use std::fmt;
use std::io::{self, Read};

use bytes::{Buf, Bytes};
use crossbeam_channel::bounded;

use crate::error::StreamError;
use crate::host::{ChunkSource, StreamChunk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyState {
    Open,
    Eof,
    Closed,
}

/// Response body backed by a host chunk source.
pub struct StreamBody {
    source: Option<Box<dyn ChunkSource>>,
    pending: Bytes,
    state: BodyState,
}

impl StreamBody {
    pub fn new(source: Box<dyn ChunkSource>) -> Self {
        Self {
            source: Some(source),
            pending: Bytes::new(),
            state: BodyState::Open,
        }
    }

    /// A body that is already at end of stream.
    pub fn empty() -> Self {
        Self {
            source: None,
            pending: Bytes::new(),
            state: BodyState::Eof,
        }
    }

    /// Cancel the chunk source. Never fails; only the first call reaches
    /// the source.
    pub fn close(&mut self) -> io::Result<()> {
        if self.state == BodyState::Closed {
            return Ok(());
        }
        self.state = BodyState::Closed;
        self.pending.clear();
        if let Some(source) = self.source.as_mut() {
            source.cancel();
            tracing::trace!("response body closed, cancel sent to chunk source");
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.state == BodyState::Closed
    }

    /// Block until the source settles one pull.
    fn pull(&mut self) -> Result<StreamChunk, StreamError> {
        let Some(source) = self.source.as_mut() else {
            return Ok(StreamChunk::Done);
        };
        let (tx, rx) = bounded(1);
        let tx_err = tx.clone();
        source.read().then(
            Box::new(move |chunk| {
                let _ = tx.try_send(Ok(chunk));
            }),
            Box::new(move |err| {
                let _ = tx_err.try_send(Err(StreamError::Host(err)));
            }),
        );
        rx.recv().unwrap_or(Err(StreamError::Abandoned))
    }
}

impl Read for StreamBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.state == BodyState::Closed {
            return Err(StreamError::Closed.into());
        }
        if buf.is_empty() {
            return Ok(0);
        }
        // Empty chunks are skipped: Ok(0) is reserved for end of stream.
        while self.pending.is_empty() {
            if self.state == BodyState::Eof {
                return Ok(0);
            }
            match self.pull() {
                Ok(StreamChunk::Data(chunk)) => self.pending = chunk,
                Ok(StreamChunk::Done) => self.state = BodyState::Eof,
                Err(err) => {
                    tracing::debug!(error = %err, "response body read failed");
                    return Err(err.into());
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

impl Drop for StreamBody {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl fmt::Debug for StreamBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBody")
            .field("pending", &self.pending.len())
            .field("state", &self.state)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HostError;
    use crate::host::{deferred, settled, BoxPromise, Resolver};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Scripted chunk source that records pulls and cancels.
    struct Script {
        chunks: VecDeque<Result<StreamChunk, HostError>>,
        pulls: Arc<AtomicUsize>,
        cancels: Arc<AtomicUsize>,
    }

    impl ChunkSource for Script {
        fn read(&mut self) -> BoxPromise<StreamChunk> {
            self.pulls.fetch_add(1, Ordering::SeqCst);
            settled(self.chunks.pop_front().unwrap_or(Ok(StreamChunk::Done)))
        }

        fn cancel(&mut self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Counters {
        pulls: Arc<AtomicUsize>,
        cancels: Arc<AtomicUsize>,
    }

    fn scripted(chunks: Vec<Result<StreamChunk, HostError>>) -> (StreamBody, Counters) {
        let pulls = Arc::new(AtomicUsize::new(0));
        let cancels = Arc::new(AtomicUsize::new(0));
        let body = StreamBody::new(Box::new(Script {
            chunks: chunks.into(),
            pulls: pulls.clone(),
            cancels: cancels.clone(),
        }));
        (body, Counters { pulls, cancels })
    }

    fn data(s: &'static str) -> Result<StreamChunk, HostError> {
        Ok(StreamChunk::Data(Bytes::from_static(s.as_bytes())))
    }

    #[test]
    fn small_buffer_drains_pending_without_pulling() {
        let (mut body, counters) = scripted(vec![data("hello")]);
        let mut buf = [0u8; 2];

        assert_eq!(body.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"he");
        assert_eq!(body.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf, b"ll");
        assert_eq!(body.read(&mut buf).unwrap(), 1);
        assert_eq!(&buf[..1], b"o");
        assert_eq!(counters.pulls.load(Ordering::SeqCst), 1);

        assert_eq!(body.read(&mut buf).unwrap(), 0);
        assert_eq!(counters.pulls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concatenated_reads_equal_concatenated_chunks() {
        let (mut body, _) = scripted(vec![data("abc"), data("defgh"), data("i")]);
        let mut out = Vec::new();
        let mut buf = [0u8; 3];
        loop {
            let n = body.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        assert_eq!(out, b"abcdefghi");
    }

    #[test]
    fn zero_length_read_never_pulls_or_consumes() {
        let (mut body, counters) = scripted(vec![data("xy")]);
        assert_eq!(body.read(&mut []).unwrap(), 0);
        assert_eq!(counters.pulls.load(Ordering::SeqCst), 0);

        let mut one = [0u8; 1];
        body.read(&mut one).unwrap();
        assert_eq!(body.read(&mut []).unwrap(), 0);
        assert_eq!(body.read(&mut one).unwrap(), 1);
        assert_eq!(&one, b"y");
        assert_eq!(counters.pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn host_failure_surfaces_message() {
        let (mut body, _) = scripted(vec![Err(HostError::new("network reset"))]);
        let err = body.read(&mut [0u8; 8]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::Other);
        assert!(err.to_string().contains("network reset"));
    }

    #[test]
    fn empty_chunks_are_skipped() {
        let (mut body, counters) = scripted(vec![data(""), data(""), data("z")]);
        let mut buf = [0u8; 4];
        assert_eq!(body.read(&mut buf).unwrap(), 1);
        assert_eq!(counters.pulls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn eof_is_sticky() {
        let (mut body, counters) = scripted(vec![]);
        let mut buf = [0u8; 4];
        assert_eq!(body.read(&mut buf).unwrap(), 0);
        assert_eq!(body.read(&mut buf).unwrap(), 0);
        assert_eq!(counters.pulls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_cancels_once_and_rejects_further_reads() {
        let (mut body, counters) = scripted(vec![data("abc")]);
        body.close().unwrap();
        body.close().unwrap();
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);

        let err = body.read(&mut [0u8; 4]).unwrap_err();
        assert!(err.to_string().contains("closed"));
        assert_eq!(counters.pulls.load(Ordering::SeqCst), 0);

        drop(body);
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn drop_without_close_cancels() {
        let (body, counters) = scripted(vec![data("abc")]);
        drop(body);
        assert_eq!(counters.cancels.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_body_reports_eof_immediately() {
        let mut body = StreamBody::empty();
        assert_eq!(body.read(&mut [0u8; 4]).unwrap(), 0);
        body.close().unwrap();
    }

    /// Chunk source whose reads are settled by the test from another thread.
    struct Remote {
        resolvers: crossbeam_channel::Sender<Resolver<StreamChunk>>,
    }

    impl ChunkSource for Remote {
        fn read(&mut self) -> BoxPromise<StreamChunk> {
            let (promise, resolver) = deferred();
            let _ = self.resolvers.send(resolver);
            Box::new(promise)
        }

        fn cancel(&mut self) {}
    }

    #[test]
    fn read_blocks_until_host_settles() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut body = StreamBody::new(Box::new(Remote { resolvers: tx }));

        let host = std::thread::spawn(move || {
            let first = rx.recv().unwrap();
            first.resolve(StreamChunk::Data(Bytes::from_static(b"remote")));
            let second = rx.recv().unwrap();
            second.resolve(StreamChunk::Done);
        });

        let mut out = String::new();
        body.read_to_string(&mut out).unwrap();
        assert_eq!(out, "remote");
        host.join().unwrap();
    }

    #[test]
    fn dropped_pull_is_an_error() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut body = StreamBody::new(Box::new(Remote { resolvers: tx }));
        let host = std::thread::spawn(move || drop(rx.recv().unwrap()));

        let err = body.read(&mut [0u8; 4]).unwrap_err();
        assert!(err.to_string().contains("without settling"));
        host.join().unwrap();
    }
}
