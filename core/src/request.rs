//! Outgoing request types.
//!
//! # Design
//! A `Request` is caller-owned plain data plus two capabilities: an optional
//! body that must be closed explicitly, and an optional cancel signal. The
//! transport takes the request by value, consumes the body, and hands the
//! rest back inside the `Response`.

use std::fmt;
use std::io::{self, Cursor, Read};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use http::{Method, Uri};
use parking_lot::Mutex;

use crate::header::Header;

/// A byte stream with an explicit close operation.
pub trait ReadCloser: Read + Send {
    fn close(&mut self) -> io::Result<()>;
}

/// Adapts any `Read` into a [`ReadCloser`] whose `close` does nothing.
#[derive(Debug)]
pub struct NopCloser<R>(pub R);

impl<R: Read> Read for NopCloser<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl<R: Read + Send> ReadCloser for NopCloser<R> {
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// One-shot, externally triggered cancellation event.
///
/// Clones share the same event. Once fired it stays fired.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    // Dropping the sender disconnects every receiver, which is how waiters
    // observe the event.
    trigger: Mutex<Option<Sender<()>>>,
    fired: Receiver<()>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                trigger: Mutex::new(Some(tx)),
                fired: rx,
            }),
        }
    }

    /// Fire the event. Later calls are no-ops.
    pub fn cancel(&self) {
        self.inner.trigger.lock().take();
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.trigger.lock().is_none()
    }

    /// A receiver that becomes ready (disconnected) once the event fires.
    pub(crate) fn watch(&self) -> Receiver<()> {
        self.inner.fired.clone()
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("canceled", &self.is_canceled())
            .finish()
    }
}

/// An HTTP request to be executed by a transport.
pub struct Request {
    pub method: Method,
    pub url: Uri,
    pub header: Header,
    pub body: Option<Box<dyn ReadCloser>>,
    pub cancel: Option<CancelSignal>,
}

impl Request {
    pub fn new(method: Method, url: Uri) -> Self {
        Self {
            method,
            url,
            header: Header::new(),
            body: None,
            cancel: None,
        }
    }

    pub fn get(url: Uri) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, key: &str, value: impl Into<String>) -> Self {
        self.header.add(key, value);
        self
    }

    pub fn with_body(mut self, body: impl ReadCloser + 'static) -> Self {
        self.body = Some(Box::new(body));
        self
    }

    /// Attach an in-memory body.
    pub fn with_bytes(self, body: impl Into<Bytes>) -> Self {
        self.with_body(NopCloser(Cursor::new(body.into())))
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("header", &self.header)
            .field("has_body", &self.body.is_some())
            .field("cancel", &self.cancel)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_signal_fires_once_and_stays_fired() {
        let signal = CancelSignal::new();
        let watcher = signal.watch();
        assert!(!signal.is_canceled());
        assert!(watcher.try_recv().is_err());

        let clone = signal.clone();
        clone.cancel();
        clone.cancel();
        assert!(signal.is_canceled());
        assert!(watcher.recv().is_err());
        assert!(signal.watch().recv().is_err());
    }

    #[test]
    fn builder_collects_headers_and_body() {
        let mut req = Request::new(Method::POST, Uri::from_static("http://example.test/upload"))
            .with_header("content-type", "text/plain")
            .with_header("X-Trace", "a")
            .with_header("x-trace", "b")
            .with_bytes("payload");

        assert_eq!(req.header.get("Content-Type"), "text/plain");
        assert_eq!(req.header.get_all("X-Trace"), ["a", "b"]);

        let mut buf = String::new();
        req.body.as_mut().unwrap().read_to_string(&mut buf).unwrap();
        assert_eq!(buf, "payload");
    }
}
