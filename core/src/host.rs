//! Collaborator interfaces for the host's asynchronous fetch primitive.
//!
//! # Design
//! The host owns the network. It is reached only through [`FetchHost`],
//! passed into the transport at construction time, never through global
//! state. Every asynchronous host operation hands back a [`Promise`]: a
//! pending completion on which the transport registers exactly one pair of
//! one-shot callbacks. The host settles the promise from whatever execution
//! context it runs on.
//!
//! `deferred()` is a ready-made promise for host implementations that
//! settle from their own threads or event loops.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use http::Method;
use parking_lot::Mutex;

use crate::error::HostError;

/// Callback run when a promise fulfils.
pub type OnFulfilled<T> = Box<dyn FnOnce(T) + Send>;

/// Callback run when a promise rejects.
pub type OnRejected = Box<dyn FnOnce(HostError) + Send>;

/// A pending, single-settlement completion produced by the host.
///
/// `then` consumes the promise, so callbacks are registered at most once.
/// The host must call at most one of them, at most once. Dropping both
/// callbacks without calling either is reported by the transport as a
/// failed settlement.
pub trait Promise<T>: Send {
    fn then(self: Box<Self>, on_fulfilled: OnFulfilled<T>, on_rejected: OnRejected);
}

pub type BoxPromise<T> = Box<dyn Promise<T>>;

/// Options handed to the host alongside the target URL.
#[derive(Debug, Clone)]
pub struct FetchInit {
    pub method: Method,
    /// Header appends in order; a multi-valued header appears once per value.
    pub headers: Vec<(String, String)>,
    /// Fully buffered request body, present only if the request had one.
    pub body: Option<Bytes>,
}

/// One settlement of a [`ChunkSource::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamChunk {
    Data(Bytes),
    Done,
}

/// The host's pull-based response body reader.
pub trait ChunkSource: Send {
    /// Request the next chunk.
    fn read(&mut self) -> BoxPromise<StreamChunk>;

    /// Ask the source to stop. Fire-and-forget: the host may still settle a
    /// read that was already in flight.
    fn cancel(&mut self);
}

/// Host-native response delivered when a fetch fulfils.
pub struct NativeResponse {
    pub status: u16,
    /// Header entries as the host reported them, possibly repeating keys.
    pub headers: Vec<(String, String)>,
    pub body: Option<Box<dyn ChunkSource>>,
}

impl fmt::Debug for NativeResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .field("has_body", &self.body.is_some())
            .finish()
    }
}

/// The host's asynchronous network primitive.
pub trait FetchHost: Send + Sync {
    /// Start a network exchange. Returns immediately with a pending
    /// completion.
    fn fetch(&self, url: &str, init: FetchInit) -> BoxPromise<NativeResponse>;
}

impl<H: FetchHost + ?Sized> FetchHost for Arc<H> {
    fn fetch(&self, url: &str, init: FetchInit) -> BoxPromise<NativeResponse> {
        (**self).fetch(url, init)
    }
}

impl<H: FetchHost + ?Sized> FetchHost for Box<H> {
    fn fetch(&self, url: &str, init: FetchInit) -> BoxPromise<NativeResponse> {
        (**self).fetch(url, init)
    }
}

// ---------------------------------------------------------------------------
// Promise helpers
// ---------------------------------------------------------------------------

/// A promise that is already settled.
pub fn settled<T: Send + 'static>(outcome: Result<T, HostError>) -> BoxPromise<T> {
    Box::new(Settled(outcome))
}

struct Settled<T>(Result<T, HostError>);

impl<T: Send> Promise<T> for Settled<T> {
    fn then(self: Box<Self>, on_fulfilled: OnFulfilled<T>, on_rejected: OnRejected) {
        dispatch(self.0, on_fulfilled, on_rejected);
    }
}

fn dispatch<T>(outcome: Result<T, HostError>, on_fulfilled: OnFulfilled<T>, on_rejected: OnRejected) {
    match outcome {
        Ok(value) => on_fulfilled(value),
        Err(err) => on_rejected(err),
    }
}

enum Slot<T> {
    Pending,
    Waiting(OnFulfilled<T>, OnRejected),
    Settled(Result<T, HostError>),
    Finished,
}

/// Promise half of [`deferred`].
pub struct Deferred<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

/// Settling half of [`deferred`]. Dropping it unsettled drops any
/// registered callbacks.
pub struct Resolver<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

/// Create a pending promise and the handle that settles it.
///
/// Settlement may happen before or after callbacks are registered. Callbacks
/// run on the thread that completes the pair: the settling thread if `then`
/// came first, otherwise the thread calling `then`.
pub fn deferred<T: Send + 'static>() -> (Deferred<T>, Resolver<T>) {
    let slot = Arc::new(Mutex::new(Slot::Pending));
    (
        Deferred { slot: slot.clone() },
        Resolver { slot },
    )
}

impl<T: Send> Promise<T> for Deferred<T> {
    fn then(self: Box<Self>, on_fulfilled: OnFulfilled<T>, on_rejected: OnRejected) {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Finished) {
            Slot::Settled(outcome) => {
                drop(slot);
                dispatch(outcome, on_fulfilled, on_rejected);
            }
            Slot::Pending => *slot = Slot::Waiting(on_fulfilled, on_rejected),
            other => *slot = other,
        }
    }
}

impl<T> Resolver<T> {
    pub fn resolve(self, value: T) {
        self.settle(Ok(value));
    }

    pub fn reject(self, err: HostError) {
        self.settle(Err(err));
    }

    pub fn settle(self, outcome: Result<T, HostError>) {
        let mut slot = self.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Finished) {
            Slot::Waiting(on_fulfilled, on_rejected) => {
                drop(slot);
                dispatch(outcome, on_fulfilled, on_rejected);
            }
            Slot::Pending => *slot = Slot::Settled(outcome),
            other => *slot = other,
        }
    }
}

impl<T> fmt::Debug for Resolver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}
