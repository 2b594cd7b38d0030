//! `#[repr(C)]` types for the FFI boundary.
//!
//! # Design
//! Borrowed inputs (`FfiHeaderRef`, `FfiRequest`, `FfiFetchInit`) use
//! `*const` pointers that stay owned by whoever passed them. Outputs built by
//! this library (`FfiHeader`, `FfiExecuteResult`) use `*mut` pointers and are
//! released through the matching `fetch_free_*` function. The host vtable and
//! the Rust-side adapters that call through it live here to keep `lib.rs`
//! focused on the `extern "C"` surface.

use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::sync::Arc;

use fetch_transport::{
    deferred, BoxPromise, CancelSignal, ChunkSource, FetchHost, FetchInit, FetchTransport,
    NativeResponse, Resolver, Response, StreamBody, StreamChunk, TransportError,
};

// ---------------------------------------------------------------------------
// Host vtable
// ---------------------------------------------------------------------------

/// Function table through which the library reaches the C host.
///
/// Every function may be called from any thread that calls `fetch_execute`
/// or `fetch_body_read`, so the host must be thread-safe. Completions may be
/// settled from any thread, synchronously inside the call or later.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct FfiFetchHost {
    pub ctx: *mut c_void,
    /// Start a fetch. `init` is only valid for the duration of the call. The
    /// host must pass `completion` to exactly one of `fetch_completion_resolve`
    /// or `fetch_completion_reject`.
    pub fetch: extern "C" fn(
        ctx: *mut c_void,
        init: *const FfiFetchInit,
        completion: *mut FfiFetchCompletion,
    ),
    /// Pull the next chunk of `stream`. The host must pass `completion` to
    /// exactly one of the `chunk_completion_*` functions.
    pub stream_read:
        extern "C" fn(ctx: *mut c_void, stream: *mut c_void, completion: *mut FfiChunkCompletion),
    /// Ask `stream` to stop. Must not block.
    pub stream_cancel: extern "C" fn(ctx: *mut c_void, stream: *mut c_void),
    /// The library holds no further references to `stream`.
    pub stream_release: extern "C" fn(ctx: *mut c_void, stream: *mut c_void),
}

/// Shared handle to the host vtable.
#[derive(Clone)]
pub(crate) struct HostVtable(Arc<FfiFetchHost>);

// SAFETY: the host contract above requires the vtable and `ctx` to be usable
// from any thread.
unsafe impl Send for HostVtable {}
unsafe impl Sync for HostVtable {}

impl HostVtable {
    pub(crate) fn new(host: FfiFetchHost) -> Self {
        Self(Arc::new(host))
    }
}

impl FetchHost for HostVtable {
    fn fetch(&self, url: &str, init: FetchInit) -> BoxPromise<NativeResponse> {
        let (promise, resolver) = deferred();
        let completion = Box::into_raw(Box::new(FfiFetchCompletion {
            resolver,
            host: self.clone(),
        }));

        // Keep the C strings and header array alive across the call.
        let method = CString::new(init.method.as_str()).unwrap_or_default();
        let url = CString::new(url).unwrap_or_default();
        let header_strings: Vec<(CString, CString)> = init
            .headers
            .iter()
            .map(|(k, v)| {
                (
                    CString::new(k.as_str()).unwrap_or_default(),
                    CString::new(v.as_str()).unwrap_or_default(),
                )
            })
            .collect();
        let headers: Vec<FfiHeaderRef> = header_strings
            .iter()
            .map(|(k, v)| FfiHeaderRef {
                key: k.as_ptr(),
                value: v.as_ptr(),
            })
            .collect();
        let (body, body_len) = match &init.body {
            Some(b) => (b.as_ptr(), b.len()),
            None => (std::ptr::null(), 0),
        };
        let ffi_init = FfiFetchInit {
            method: method.as_ptr(),
            url: url.as_ptr(),
            headers: if headers.is_empty() {
                std::ptr::null()
            } else {
                headers.as_ptr()
            },
            headers_len: headers.len() as u32,
            body,
            body_len,
        };

        (self.0.fetch)(self.0.ctx, &ffi_init, completion);
        Box::new(promise)
    }
}

/// Chunk source backed by a host stream handle.
pub(crate) struct HostStream {
    host: HostVtable,
    stream: *mut c_void,
}

// SAFETY: stream handles follow the same thread-safety contract as the host.
unsafe impl Send for HostStream {}

impl ChunkSource for HostStream {
    fn read(&mut self) -> BoxPromise<StreamChunk> {
        let (promise, resolver) = deferred();
        let completion = Box::into_raw(Box::new(FfiChunkCompletion { resolver }));
        (self.host.0.stream_read)(self.host.0.ctx, self.stream, completion);
        Box::new(promise)
    }

    fn cancel(&mut self) {
        (self.host.0.stream_cancel)(self.host.0.ctx, self.stream);
    }
}

impl Drop for HostStream {
    fn drop(&mut self) {
        (self.host.0.stream_release)(self.host.0.ctx, self.stream);
    }
}

// ---------------------------------------------------------------------------
// Completions (host-facing)
// ---------------------------------------------------------------------------

/// Pending fetch handed to the host. Consumed by `fetch_completion_resolve`
/// or `fetch_completion_reject`.
pub struct FfiFetchCompletion {
    pub(crate) resolver: Resolver<NativeResponse>,
    pub(crate) host: HostVtable,
}

impl FfiFetchCompletion {
    /// Wrap a host stream handle; null means the response has no body.
    pub(crate) fn body(&self, stream: *mut c_void) -> Option<Box<dyn ChunkSource>> {
        if stream.is_null() {
            return None;
        }
        Some(Box::new(HostStream {
            host: self.host.clone(),
            stream,
        }))
    }
}

/// Pending chunk pull handed to the host. Consumed by one of the
/// `chunk_completion_*` functions.
pub struct FfiChunkCompletion {
    pub(crate) resolver: Resolver<StreamChunk>,
}

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// A header as a pair of borrowed C strings.
#[repr(C)]
pub struct FfiHeaderRef {
    pub key: *const c_char,
    pub value: *const c_char,
}

/// Fetch options passed to the host's `fetch` function.
///
/// `body` is null when the request has no body.
#[repr(C)]
pub struct FfiFetchInit {
    pub method: *const c_char,
    pub url: *const c_char,
    pub headers: *const FfiHeaderRef,
    pub headers_len: u32,
    pub body: *const u8,
    pub body_len: usize,
}

/// A request described by the C caller. All pointers are borrowed for the
/// duration of `fetch_execute`. `body` is null when there is no body.
#[repr(C)]
pub struct FfiRequest {
    pub method: *const c_char,
    pub url: *const c_char,
    pub headers: *const FfiHeaderRef,
    pub headers_len: u32,
    pub body: *const u8,
    pub body_len: usize,
}

/// Read `len` borrowed headers into owned pairs. Null keys are skipped.
///
/// # Safety
/// `headers` must point to `len` valid entries whose non-null strings are
/// NUL-terminated.
pub(crate) unsafe fn headers_from_ffi(
    headers: *const FfiHeaderRef,
    len: u32,
) -> Vec<(String, String)> {
    if headers.is_null() || len == 0 {
        return Vec::new();
    }
    std::slice::from_raw_parts(headers, len as usize)
        .iter()
        .filter(|h| !h.key.is_null())
        .map(|h| {
            let key = CStr::from_ptr(h.key).to_string_lossy().into_owned();
            let value = if h.value.is_null() {
                String::new()
            } else {
                CStr::from_ptr(h.value).to_string_lossy().into_owned()
            };
            (key, value)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Opaque handle to a transport bound to a host vtable.
pub struct FfiTransport {
    pub(crate) inner: FetchTransport<HostVtable>,
}

/// Opaque handle to a cancel signal.
pub struct FfiCancel {
    pub(crate) inner: CancelSignal,
}

/// Opaque handle to a response body.
pub struct FfiBody {
    pub(crate) inner: StreamBody,
}

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Error codes returned by `fetch_execute` and the body functions.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiErrorCode {
    Ok = 0,
    RequestBody = 1,
    Fetch = 2,
    Canceled = 3,
    InvalidArg = 4,
    NullArg = 5,
    Panic = 6,
}

/// Outcome of `fetch_body_read`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FfiReadStatus {
    Ok = 0,
    Eof = 1,
    Error = 2,
    NullArg = 3,
    Panic = 4,
}

/// A single header owned by this library.
#[repr(C)]
pub struct FfiHeader {
    pub key: *mut c_char,
    pub value: *mut c_char,
}

/// Result envelope for `fetch_execute`.
///
/// On success `error_code` is `Ok`, `error_message` is null and the response
/// fields are populated. On failure `error_code` describes the category,
/// `error_message` is a human-readable C string, and the response fields are
/// zero/null.
#[repr(C)]
pub struct FfiExecuteResult {
    pub error_code: FfiErrorCode,
    pub error_message: *mut c_char,
    pub status_code: u16,
    pub status: *mut c_char,
    pub content_length: i64,
    pub headers: *mut FfiHeader,
    pub headers_len: u32,
    pub body: *mut FfiBody,
}

pub(crate) fn c_string(s: impl Into<Vec<u8>>) -> *mut c_char {
    CString::new(s).unwrap_or_default().into_raw()
}

impl FfiExecuteResult {
    fn error(error_code: FfiErrorCode, msg: &str) -> *mut Self {
        Box::into_raw(Box::new(FfiExecuteResult {
            error_code,
            error_message: c_string(msg),
            status_code: 0,
            status: std::ptr::null_mut(),
            content_length: -1,
            headers: std::ptr::null_mut(),
            headers_len: 0,
            body: std::ptr::null_mut(),
        }))
    }

    /// Build a success result, moving the body behind an opaque handle.
    pub(crate) fn ok(resp: Response) -> *mut Self {
        let Response {
            status,
            status_code,
            header,
            content_length,
            body,
            ..
        } = resp;

        let ffi_headers: Box<[FfiHeader]> = header
            .to_pairs()
            .into_iter()
            .map(|(k, v)| FfiHeader {
                key: c_string(k),
                value: c_string(v),
            })
            .collect();
        let headers_len = ffi_headers.len() as u32;
        let headers = if ffi_headers.is_empty() {
            std::ptr::null_mut()
        } else {
            Box::into_raw(ffi_headers) as *mut FfiHeader
        };

        Box::into_raw(Box::new(FfiExecuteResult {
            error_code: FfiErrorCode::Ok,
            error_message: std::ptr::null_mut(),
            status_code,
            status: c_string(status),
            content_length,
            headers,
            headers_len,
            body: Box::into_raw(Box::new(FfiBody { inner: body })),
        }))
    }

    /// Build an error result from a `TransportError`.
    pub(crate) fn from_error(err: TransportError) -> *mut Self {
        let code = match &err {
            TransportError::RequestBody(_) => FfiErrorCode::RequestBody,
            TransportError::Fetch { .. } => FfiErrorCode::Fetch,
            TransportError::Canceled => FfiErrorCode::Canceled,
        };
        Self::error(code, &err.to_string())
    }

    pub(crate) fn invalid_arg(msg: &str) -> *mut Self {
        Self::error(FfiErrorCode::InvalidArg, msg)
    }

    pub(crate) fn null_arg(name: &str) -> *mut Self {
        Self::error(FfiErrorCode::NullArg, &format!("null argument: {name}"))
    }

    pub(crate) fn panic(msg: &str) -> *mut Self {
        Self::error(FfiErrorCode::Panic, msg)
    }
}
