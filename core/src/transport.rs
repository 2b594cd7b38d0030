//! Blocking transport over the host's asynchronous fetch.
//!
//! # Design
//! Each `execute` call runs its own small state machine:
//!
//! ```text
//! Idle -> BodyBuffered -> PrimitiveInvoked -> Completed | Failed | Canceled
//! ```
//!
//! The request body is read to the end and closed before the host is
//! invoked. The host's promise callbacks feed a capacity-one channel through
//! a shared [`Handoff`]; the caller parks in `select!` on that channel and on
//! the request's cancel signal, whichever is ready first.
//!
//! Cancellation does not abort the host's fetch. When the host later
//! fulfils an abandoned exchange, the handoff cancels the orphaned body so
//! the chunk source is not left open.

use std::io::Read;
use std::sync::{Arc, Weak};

use bytes::Bytes;
use crossbeam_channel::{bounded, never, select, Receiver, Sender};
use parking_lot::Mutex;

use crate::config::TransportConfig;
use crate::error::{HostError, TransportError};
use crate::host::{FetchHost, FetchInit, NativeResponse};
use crate::request::{ReadCloser, Request};
use crate::response::Response;

/// Blocking request/response contract.
pub trait RoundTrip {
    fn round_trip(&self, req: Request) -> Result<Response, TransportError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExchangeState {
    Idle,
    BodyBuffered,
    PrimitiveInvoked,
    Completed,
    Failed,
    Canceled,
}

enum Settlement {
    Fulfilled(NativeResponse),
    Rejected(HostError),
}

/// Delivery point shared by the two promise callbacks of one exchange.
///
/// The callbacks hold the only strong references, so once the host has
/// called or dropped both, the sender goes away and the waiting caller
/// observes a disconnect.
struct Handoff {
    tx: Mutex<Option<Sender<Settlement>>>,
}

impl Handoff {
    fn deliver(&self, settlement: Settlement) {
        let tx = self.tx.lock();
        match tx.as_ref() {
            Some(tx) => {
                let _ = tx.try_send(settlement);
            }
            None => discard(settlement),
        }
    }

    /// Stop accepting settlements; later ones are discarded on delivery.
    fn abandon(&self) {
        self.tx.lock().take();
    }
}

/// Discard whatever reached the channel before the exchange was abandoned.
fn drain(rx: &Receiver<Settlement>) {
    while let Ok(settlement) = rx.try_recv() {
        discard(settlement);
    }
}

fn discard(settlement: Settlement) {
    match settlement {
        Settlement::Fulfilled(native) => {
            tracing::debug!(status = native.status, "discarding fetch response after cancellation");
            if let Some(mut body) = native.body {
                body.cancel();
            }
        }
        Settlement::Rejected(err) => {
            tracing::debug!(error = %err, "discarding fetch rejection after cancellation");
        }
    }
}

/// Transport that drives a [`FetchHost`] and blocks the caller until the
/// host settles.
pub struct FetchTransport<H> {
    host: H,
    config: TransportConfig,
}

impl<H: FetchHost> FetchTransport<H> {
    pub fn new(host: H) -> Self {
        Self::with_config(host, TransportConfig::default())
    }

    pub fn with_config(host: H, config: TransportConfig) -> Self {
        Self { host, config }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Execute one request, blocking until the host fulfils, rejects, or the
    /// request's cancel signal fires.
    pub fn execute(&self, mut req: Request) -> Result<Response, TransportError> {
        let mut state = ExchangeState::Idle;

        let headers = req.header.to_pairs();
        let body = match req.body.take() {
            Some(body) => Some(buffer_body(body)?),
            None => None,
        };
        advance(&mut state, ExchangeState::BodyBuffered);

        let url = req.url.to_string();
        tracing::debug!(method = %req.method, url = %url, "dispatching fetch");
        let init = FetchInit {
            method: req.method.clone(),
            headers,
            body,
        };
        let pending = self.host.fetch(&url, init);
        advance(&mut state, ExchangeState::PrimitiveInvoked);

        let (tx, rx) = bounded(1);
        let handoff = Arc::new(Handoff {
            tx: Mutex::new(Some(tx)),
        });
        let watch: Weak<Handoff> = Arc::downgrade(&handoff);
        let on_rejected = handoff.clone();
        pending.then(
            Box::new(move |native| handoff.deliver(Settlement::Fulfilled(native))),
            Box::new(move |err| on_rejected.deliver(Settlement::Rejected(err))),
        );

        let cancel = match &req.cancel {
            Some(signal) => signal.watch(),
            None => never(),
        };

        let settlement = select! {
            recv(rx) -> msg => msg.ok(),
            recv(cancel) -> _ => {
                if let Some(handoff) = watch.upgrade() {
                    handoff.abandon();
                }
                // The host may have settled before the cancel won the race,
                // in which case the handoff is already gone.
                drain(&rx);
                advance(&mut state, ExchangeState::Canceled);
                tracing::debug!(url = %url, "fetch canceled by caller");
                return Err(TransportError::Canceled);
            }
        };

        match settlement {
            Some(Settlement::Fulfilled(native)) => {
                advance(&mut state, ExchangeState::Completed);
                tracing::debug!(url = %url, status = native.status, "fetch completed");
                Ok(Response::from_native(native, req))
            }
            Some(Settlement::Rejected(err)) => {
                advance(&mut state, ExchangeState::Failed);
                tracing::debug!(url = %url, error = %err, "fetch rejected");
                Err(self.fetch_error(err.message()))
            }
            None => {
                advance(&mut state, ExchangeState::Failed);
                tracing::warn!(url = %url, "host dropped fetch without settling");
                Err(self.fetch_error("fetch dropped without settling"))
            }
        }
    }

    fn fetch_error(&self, detail: &str) -> TransportError {
        TransportError::Fetch {
            detail: self
                .config
                .expose_host_errors
                .then(|| detail.to_string()),
        }
    }
}

impl<H: FetchHost> RoundTrip for FetchTransport<H> {
    fn round_trip(&self, req: Request) -> Result<Response, TransportError> {
        self.execute(req)
    }
}

fn advance(state: &mut ExchangeState, next: ExchangeState) {
    tracing::trace!(from = ?*state, to = ?next, "exchange state");
    *state = next;
}

/// Read the request body to the end, then close it whatever the outcome.
fn buffer_body(mut body: Box<dyn ReadCloser>) -> Result<Bytes, TransportError> {
    let mut buf = Vec::new();
    let read = body.read_to_end(&mut buf);
    if let Err(err) = body.close() {
        tracing::debug!(error = %err, "closing request body failed");
    }
    read.map_err(TransportError::RequestBody)?;
    Ok(Bytes::from(buf))
}
