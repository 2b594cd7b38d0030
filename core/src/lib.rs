//! Blocking HTTP transport over a host-supplied asynchronous fetch.
//!
//! # Overview
//! The host environment owns the network and exposes it as a promise-based
//! `fetch` plus a pull-based body reader. This crate turns that into the
//! usual blocking contract: `execute` returns a `Response` (or an error) and
//! the response body implements `std::io::Read`.
//!
//! # Design
//! - `FetchHost` is an explicit collaborator passed to `FetchTransport`, so
//!   tests and embedders substitute their own host.
//! - Every wait is a parked thread on a per-call channel fed by the host's
//!   callbacks; nothing polls.
//! - The request body is always read and closed before the host is invoked,
//!   including when reading it fails.
//! - Cancellation is best-effort: it ends the caller's wait but does not
//!   abort the host's in-flight work.

pub mod body;
pub mod config;
pub mod error;
pub mod header;
pub mod host;
pub mod request;
pub mod response;
pub mod swap;
pub mod transport;

pub use body::StreamBody;
pub use config::TransportConfig;
pub use error::{ConfigError, HostError, IndexOutOfRange, StreamError, TransportError};
pub use header::{canonical_header_key, Header};
pub use host::{
    deferred, settled, BoxPromise, ChunkSource, Deferred, FetchHost, FetchInit, NativeResponse,
    Promise, Resolver, StreamChunk,
};
pub use request::{CancelSignal, NopCloser, ReadCloser, Request};
pub use response::Response;
pub use transport::{FetchTransport, RoundTrip};
