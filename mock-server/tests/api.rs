use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, lines_body, Echo};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- hello ---

#[tokio::test]
async fn hello_returns_plain_text() {
    let resp = app().oneshot(get("/hello")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()[http::header::CONTENT_TYPE], "text/plain");
    assert_eq!(body_bytes(resp).await, "hello");
}

// --- echo ---

#[tokio::test]
async fn echo_reflects_method_headers_and_body() {
    let req = Request::builder()
        .method("POST")
        .uri("/echo")
        .header("x-trace", "abc")
        .body("payload".to_string())
        .unwrap();
    let resp = app().oneshot(req).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.body, "payload");
    assert!(echo
        .headers
        .contains(&("x-trace".to_string(), "abc".to_string())));
}

#[tokio::test]
async fn echo_rejects_get() {
    let resp = app().oneshot(get("/echo")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// --- lines ---

#[tokio::test]
async fn lines_returns_n_lines() {
    let resp = app().oneshot(get("/lines/4")).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, lines_body(4));
}

#[tokio::test]
async fn lines_rejects_non_numeric_count() {
    let resp = app().oneshot(get("/lines/many")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- status ---

#[tokio::test]
async fn status_returns_requested_code() {
    let resp = app().oneshot(get("/status/418")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);

    let resp = app().oneshot(get("/status/503")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// --- headers ---

#[tokio::test]
async fn headers_repeats_x_multi() {
    let resp = app().oneshot(get("/headers")).await.unwrap();

    let values: Vec<_> = resp
        .headers()
        .get_all("x-multi")
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert_eq!(values, ["first", "second"]);
}
