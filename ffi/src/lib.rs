//! C-ABI wrapper around `fetch-transport`.
//!
//! # Overview
//! Lets a C host that owns an asynchronous fetch primitive hand it to the
//! blocking transport, and lets C callers execute requests and read response
//! bodies without touching Rust types.
//!
//! # Design
//! - Every `extern "C"` function wraps its body in `catch_unwind` so panics
//!   never cross the FFI boundary.
//! - The host is a vtable of function pointers (`FfiFetchHost`). Each fetch
//!   or chunk pull hands the host an owned completion that it settles through
//!   exactly one `fetch_completion_*` / `chunk_completion_*` call, from any
//!   thread.
//! - A single `FfiExecuteResult` envelope carries either the response or an
//!   error code with a message. The body stays behind an opaque handle read
//!   through `fetch_body_read`.
//! - The C caller owns all returned pointers and must call the matching
//!   `fetch_free_*` function to release them.

pub mod types;

use std::ffi::{c_void, CStr, CString};
use std::io::Read;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

use fetch_transport::{
    CancelSignal, FetchTransport, HostError, NativeResponse, Request, StreamChunk,
    TransportConfig,
};
use http::{Method, Uri};

use types::*;

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install a `tracing` subscriber that writes to stderr, filtered by
/// `RUST_LOG` (default `warn`). Returns false if a subscriber was already
/// installed.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_init_logging() -> bool {
    catch_unwind(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .is_ok()
    })
    .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Transport lifecycle
// ---------------------------------------------------------------------------

/// Create a transport bound to `host`. The vtable is copied; `host->ctx`
/// must stay valid until `fetch_transport_free` and until every result
/// produced by the transport has been freed.
///
/// Returns null if `host` is null or if an internal panic occurs.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_transport_new(host: *const FfiFetchHost) -> *mut FfiTransport {
    catch_unwind(|| {
        if host.is_null() {
            return std::ptr::null_mut();
        }
        let host = unsafe { *host };
        let config = TransportConfig::from_env().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "ignoring transport configuration");
            TransportConfig::default()
        });
        let inner = FetchTransport::with_config(HostVtable::new(host), config);
        Box::into_raw(Box::new(FfiTransport { inner }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Free a transport created by `fetch_transport_new`. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_transport_free(transport: *mut FfiTransport) {
    if !transport.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(transport) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

/// Create an unfired cancel signal. Free it with `fetch_cancel_free`.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_cancel_new() -> *mut FfiCancel {
    catch_unwind(|| {
        Box::into_raw(Box::new(FfiCancel {
            inner: CancelSignal::new(),
        }))
    })
    .unwrap_or(std::ptr::null_mut())
}

/// Fire `cancel`. Any `fetch_execute` waiting on it returns `Canceled`.
/// May be called from any thread, any number of times.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_cancel_fire(cancel: *const FfiCancel) {
    if !cancel.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            unsafe { &*cancel }.inner.cancel();
        }));
    }
}

/// Free a cancel signal. Safe to call with null. Must not race a
/// `fetch_execute` still using it.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_cancel_free(cancel: *mut FfiCancel) {
    if !cancel.is_null() {
        let _ = catch_unwind(AssertUnwindSafe(|| {
            drop(unsafe { Box::from_raw(cancel) });
        }));
    }
}

// ---------------------------------------------------------------------------
// Execute
// ---------------------------------------------------------------------------

fn request_from_ffi(request: &FfiRequest) -> Result<Request, *mut FfiExecuteResult> {
    if request.method.is_null() {
        return Err(FfiExecuteResult::null_arg("request.method"));
    }
    if request.url.is_null() {
        return Err(FfiExecuteResult::null_arg("request.url"));
    }

    let method = unsafe { CStr::from_ptr(request.method) }.to_bytes();
    let method = Method::from_bytes(method)
        .map_err(|_| FfiExecuteResult::invalid_arg("invalid request method"))?;
    let url = unsafe { CStr::from_ptr(request.url) }
        .to_str()
        .ok()
        .and_then(|url| url.parse::<Uri>().ok())
        .ok_or_else(|| FfiExecuteResult::invalid_arg("invalid request url"))?;

    let mut req = Request::new(method, url);
    for (key, value) in unsafe { headers_from_ffi(request.headers, request.headers_len) } {
        req = req.with_header(&key, value);
    }
    if !request.body.is_null() {
        let body = unsafe { std::slice::from_raw_parts(request.body, request.body_len) };
        req = req.with_bytes(body.to_vec());
    }
    Ok(req)
}

/// Execute `request`, blocking until the host settles the fetch or `cancel`
/// fires. `cancel` may be null.
///
/// Always returns a result (never null); free it with `fetch_free_result`.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_execute(
    transport: *const FfiTransport,
    request: *const FfiRequest,
    cancel: *const FfiCancel,
) -> *mut FfiExecuteResult {
    catch_unwind(AssertUnwindSafe(|| {
        if transport.is_null() {
            return FfiExecuteResult::null_arg("transport");
        }
        if request.is_null() {
            return FfiExecuteResult::null_arg("request");
        }
        let transport = unsafe { &*transport };
        let mut req = match request_from_ffi(unsafe { &*request }) {
            Ok(req) => req,
            Err(result) => return result,
        };
        if !cancel.is_null() {
            req = req.with_cancel(unsafe { &*cancel }.inner.clone());
        }

        match transport.inner.execute(req) {
            Ok(resp) => FfiExecuteResult::ok(resp),
            Err(err) => FfiExecuteResult::from_error(err),
        }
    }))
    .unwrap_or_else(|_| FfiExecuteResult::panic("panic in fetch_execute"))
}

// ---------------------------------------------------------------------------
// Body
// ---------------------------------------------------------------------------

/// Read up to `len` bytes of the response body into `buf`, storing the count
/// in `*out_n`.
///
/// Returns `Eof` once the body is exhausted. On `Error`, if `out_error` is
/// non-null, `*out_error` receives a message to free with `fetch_free_string`.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_body_read(
    result: *mut FfiExecuteResult,
    buf: *mut u8,
    len: usize,
    out_n: *mut usize,
    out_error: *mut *mut c_char,
) -> FfiReadStatus {
    catch_unwind(AssertUnwindSafe(|| {
        if result.is_null() || out_n.is_null() || (buf.is_null() && len > 0) {
            return FfiReadStatus::NullArg;
        }
        unsafe { *out_n = 0 };
        let result = unsafe { &mut *result };
        if result.body.is_null() {
            return FfiReadStatus::NullArg;
        }
        let body = unsafe { &mut *result.body };
        let dst: &mut [u8] = if len == 0 {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(buf, len) }
        };

        match body.inner.read(dst) {
            Ok(0) if len > 0 => FfiReadStatus::Eof,
            Ok(n) => {
                unsafe { *out_n = n };
                FfiReadStatus::Ok
            }
            Err(err) => {
                if !out_error.is_null() {
                    unsafe { *out_error = c_string(err.to_string()) };
                }
                FfiReadStatus::Error
            }
        }
    }))
    .unwrap_or(FfiReadStatus::Panic)
}

/// Close the response body, cancelling the host stream. Idempotent.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_body_close(result: *mut FfiExecuteResult) -> FfiErrorCode {
    catch_unwind(AssertUnwindSafe(|| {
        if result.is_null() {
            return FfiErrorCode::NullArg;
        }
        let result = unsafe { &mut *result };
        if result.body.is_null() {
            return FfiErrorCode::NullArg;
        }
        match unsafe { &mut *result.body }.inner.close() {
            Ok(()) => FfiErrorCode::Ok,
            Err(err) => {
                tracing::debug!(error = %err, "closing response body failed");
                FfiErrorCode::Fetch
            }
        }
    }))
    .unwrap_or(FfiErrorCode::Panic)
}

// ---------------------------------------------------------------------------
// Host completions
// ---------------------------------------------------------------------------

/// Fulfil a pending fetch. `headers` is borrowed for the duration of the
/// call. `stream` is the host's body handle, or null for no body; the library
/// takes it over and later calls `stream_release` on it exactly once.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_completion_resolve(
    completion: *mut FfiFetchCompletion,
    status: u16,
    headers: *const FfiHeaderRef,
    headers_len: u32,
    stream: *mut c_void,
) {
    if completion.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let completion = unsafe { Box::from_raw(completion) };
        let native = NativeResponse {
            status,
            headers: unsafe { headers_from_ffi(headers, headers_len) },
            body: completion.body(stream),
        };
        completion.resolver.resolve(native);
    }));
}

/// Reject a pending fetch with `message` (may be null).
#[unsafe(no_mangle)]
pub extern "C" fn fetch_completion_reject(
    completion: *mut FfiFetchCompletion,
    message: *const c_char,
) {
    if completion.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let completion = unsafe { Box::from_raw(completion) };
        completion.resolver.reject(host_error(message, "fetch rejected"));
    }));
}

/// Settle a chunk pull with `len` bytes copied from `data`.
#[unsafe(no_mangle)]
pub extern "C" fn chunk_completion_data(
    completion: *mut FfiChunkCompletion,
    data: *const u8,
    len: usize,
) {
    if completion.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let completion = unsafe { Box::from_raw(completion) };
        let chunk = if data.is_null() || len == 0 {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(data, len) }.to_vec()
        };
        completion.resolver.resolve(StreamChunk::Data(chunk.into()));
    }));
}

/// Settle a chunk pull with end of stream.
#[unsafe(no_mangle)]
pub extern "C" fn chunk_completion_done(completion: *mut FfiChunkCompletion) {
    if completion.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let completion = unsafe { Box::from_raw(completion) };
        completion.resolver.resolve(StreamChunk::Done);
    }));
}

/// Fail a chunk pull with `message` (may be null).
#[unsafe(no_mangle)]
pub extern "C" fn chunk_completion_reject(
    completion: *mut FfiChunkCompletion,
    message: *const c_char,
) {
    if completion.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let completion = unsafe { Box::from_raw(completion) };
        completion
            .resolver
            .reject(host_error(message, "stream read rejected"));
    }));
}

fn host_error(message: *const c_char, fallback: &str) -> HostError {
    if message.is_null() {
        return HostError::new(fallback);
    }
    HostError::new(unsafe { CStr::from_ptr(message) }.to_string_lossy())
}

// ---------------------------------------------------------------------------
// Free functions
// ---------------------------------------------------------------------------

/// Free an `FfiExecuteResult` returned by `fetch_execute`. Safe to call with
/// null. An unclosed body is closed first.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_free_result(result: *mut FfiExecuteResult) {
    if result.is_null() {
        return;
    }
    let _ = catch_unwind(AssertUnwindSafe(|| {
        let result = unsafe { Box::from_raw(result) };
        if !result.error_message.is_null() {
            drop(unsafe { CString::from_raw(result.error_message) });
        }
        if !result.status.is_null() {
            drop(unsafe { CString::from_raw(result.status) });
        }
        if !result.headers.is_null() && result.headers_len > 0 {
            let headers = unsafe {
                Box::from_raw(std::ptr::slice_from_raw_parts_mut(
                    result.headers,
                    result.headers_len as usize,
                ))
            };
            for h in headers.iter() {
                if !h.key.is_null() {
                    drop(unsafe { CString::from_raw(h.key) });
                }
                if !h.value.is_null() {
                    drop(unsafe { CString::from_raw(h.value) });
                }
            }
        }
        if !result.body.is_null() {
            drop(unsafe { Box::from_raw(result.body) });
        }
    }));
}

/// Free a C string allocated by this library. Safe to call with null.
#[unsafe(no_mangle)]
pub extern "C" fn fetch_free_string(s: *mut c_char) {
    if !s.is_null() {
        let _ = catch_unwind(|| {
            drop(unsafe { CString::from_raw(s) });
        });
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
