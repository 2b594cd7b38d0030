//! Error types for the fetch transport.
//!
//! # Design
//! Cancellation gets a dedicated variant because callers routinely tell
//! "I gave up on this request" apart from "the host could not complete it".
//! Host rejections land in `Fetch`, optionally carrying the host's own
//! description. Body stream failures surface through `std::io::Error` (the
//! `Read` contract), with a `StreamError` as the inner error.

use std::io;

use thiserror::Error;

/// Rejection reason supplied by the host when a promise settles with failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HostError {
    message: String,
}

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors returned by [`crate::FetchTransport::execute`].
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading the outgoing request body failed. The body has been closed
    /// and the host was never invoked.
    #[error("reading request body: {0}")]
    RequestBody(#[source] io::Error),

    /// The host rejected the fetch, or dropped it without settling.
    #[error("fetch failed{}", detail_suffix(.detail))]
    Fetch { detail: Option<String> },

    /// The request's cancel signal fired before the fetch settled.
    #[error("request canceled")]
    Canceled,
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(d) => format!(": {d}"),
        None => String::new(),
    }
}

/// Errors surfaced from reading a response body.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The chunk source rejected a read.
    #[error("body stream failed: {0}")]
    Host(#[from] HostError),

    /// The chunk source dropped a pending read without settling it.
    #[error("body stream read was dropped without settling")]
    Abandoned,

    /// The body was read after `close`.
    #[error("read on closed response body")]
    Closed,
}

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        io::Error::other(err)
    }
}

/// Errors produced while loading [`crate::TransportConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: expected true, false, 1 or 0")]
    InvalidEnv { var: &'static str, value: String },
}

/// Swap indices outside the slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("index out of range: swap({i}, {j}) on slice of length {len}")]
pub struct IndexOutOfRange {
    pub i: usize,
    pub j: usize,
    pub len: usize,
}
