use axum::{
    body::Bytes,
    extract::Path,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

/// What `/echo` saw of the incoming request.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

pub fn app() -> Router {
    Router::new()
        .route("/hello", get(hello))
        .route("/echo", post(echo).put(echo))
        .route("/lines/{n}", get(lines))
        .route("/status/{code}", get(status))
        .route("/headers", get(multi_headers))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn hello() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/plain")], "hello")
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    tracing::debug!(%method, len = body.len(), "echo");
    let headers = headers
        .iter()
        .map(|(k, v)| (k.to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    Json(Echo {
        method: method.to_string(),
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// `n` newline-terminated lines, `line 0` through `line n-1`.
pub fn lines_body(n: usize) -> String {
    (0..n).map(|i| format!("line {i}\n")).collect()
}

async fn lines(Path(n): Path<usize>) -> String {
    lines_body(n)
}

async fn status(Path(code): Path<u16>) -> StatusCode {
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn multi_headers() -> Response {
    let mut headers = HeaderMap::new();
    headers.append("x-multi", HeaderValue::from_static("first"));
    headers.append("x-multi", HeaderValue::from_static("second"));
    (headers, "").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lines_body_numbers_each_line() {
        assert_eq!(lines_body(0), "");
        assert_eq!(lines_body(3), "line 0\nline 1\nline 2\n");
    }

    #[test]
    fn echo_roundtrips_through_json() {
        let echo = Echo {
            method: "POST".to_string(),
            headers: vec![("content-type".to_string(), "text/plain".to_string())],
            body: "payload".to_string(),
        };
        let json = serde_json::to_string(&echo).unwrap();
        let back: Echo = serde_json::from_str(&json).unwrap();
        assert_eq!(back, echo);
    }
}
