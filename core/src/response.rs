//! Response materialized from a fulfilled host fetch.

use http::StatusCode;

use crate::body::StreamBody;
use crate::header::Header;
use crate::host::NativeResponse;
use crate::request::Request;

/// An HTTP response. Only ever built from a fulfilled fetch; never partial.
#[derive(Debug)]
pub struct Response {
    /// Status line, e.g. `"200 OK"`.
    pub status: String,
    pub status_code: u16,
    pub header: Header,
    /// Parsed `Content-Length`, or `-1` when absent or malformed.
    pub content_length: i64,
    pub body: StreamBody,
    /// The request that produced this response. Its body has been consumed.
    pub request: Request,
}

impl Response {
    pub(crate) fn from_native(native: NativeResponse, request: Request) -> Self {
        let header: Header = native.headers.into_iter().collect();
        let content_length = content_length(&header);
        let body = match native.body {
            Some(source) => StreamBody::new(source),
            None => StreamBody::empty(),
        };
        Self {
            status: status_line(native.status),
            status_code: native.status,
            header,
            content_length,
            body,
            request,
        }
    }
}

/// `"{code} {reason}"`; the reason is empty for codes without a standard
/// phrase.
pub fn status_line(code: u16) -> String {
    let reason = StatusCode::from_u16(code)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("");
    format!("{code} {reason}")
}

/// `Content-Length` as a signed integer, `-1` if absent or not an integer.
pub fn content_length(header: &Header) -> i64 {
    header.get("Content-Length").parse().unwrap_or(-1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_line_pairs_code_with_reason() {
        assert_eq!(status_line(200), "200 OK");
        assert_eq!(status_line(404), "404 Not Found");
        assert_eq!(status_line(599), "599 ");
    }

    #[test]
    fn content_length_parses_integers_only() {
        let mut h = Header::new();
        assert_eq!(content_length(&h), -1);

        h.set("content-length", "42");
        assert_eq!(content_length(&h), 42);

        h.set("Content-Length", "abc");
        assert_eq!(content_length(&h), -1);

        h.set("Content-Length", "");
        assert_eq!(content_length(&h), -1);
    }
}
