use std::path::Path;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Method, Request, StatusCode, header};
use axum::response::Response;
use castserver::{MediaState, media_router};
use tempfile::TempDir;
use tower::ServiceExt;

fn media_dir() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    let content: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
    std::fs::write(dir.path().join("clip.mp4"), &content).unwrap();
    std::fs::write(dir.path().join("my movie.mp4"), b"spaced").unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"text").unwrap();
    std::fs::write(dir.path().join("film.mkv"), b"matroska").unwrap();
    std::fs::write(dir.path().join("empty.mp4"), b"").unwrap();
    dir
}

fn router(root: &Path) -> Router {
    media_router(MediaState::new(root, None))
}

async fn send(app: Router, method: Method, uri: &str, range: Option<&str>) -> Response {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(range) = range {
        request = request.header(header::RANGE, range);
    }
    app.oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap()
}

fn header_str<'a>(response: &'a Response, name: header::HeaderName) -> Option<&'a str> {
    response.headers().get(name).map(|v| v.to_str().unwrap())
}

async fn body_len(response: Response) -> usize {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().len()
}

#[tokio::test]
async fn test_whole_file_without_range() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/clip.mp4", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("1000"));
    assert_eq!(header_str(&response, header::ACCEPT_RANGES), Some("bytes"));
    assert_eq!(header_str(&response, header::CONTENT_TYPE), Some("video/mp4"));
    assert_eq!(
        header_str(&response, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        Some("*")
    );
    assert_eq!(body_len(response).await, 1000);
}

#[tokio::test]
async fn test_closed_range() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/clip.mp4", Some("bytes=0-99")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 0-99/1000")
    );
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("100"));
    assert_eq!(body_len(response).await, 100);
}

#[tokio::test]
async fn test_open_range_returns_the_tail() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/clip.mp4", Some("bytes=900-")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 900-999/1000")
    );
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(body.len(), 100);
    assert_eq!(body[0], (900 % 251) as u8);
}

#[tokio::test]
async fn test_range_past_the_end_is_not_satisfiable() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/clip.mp4", Some("bytes=2000-")).await;

    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes */1000")
    );
}

#[tokio::test]
async fn test_malformed_range_is_not_satisfiable() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/clip.mp4", Some("items=0-10")).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

    let response = send(router(dir.path()), Method::GET, "/empty.mp4", Some("bytes=0-")).await;
    assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
}

#[tokio::test]
async fn test_backwards_end_is_clamped() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/clip.mp4", Some("bytes=500-100")).await;

    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 500-999/1000")
    );
    assert_eq!(body_len(response).await, 500);
}

#[tokio::test]
async fn test_unsupported_extension_wins_over_missing_file() {
    let dir = media_dir();
    let existing = send(router(dir.path()), Method::GET, "/notes.txt", None).await;
    let missing = send(router(dir.path()), Method::GET, "/absent.txt", None).await;

    assert_eq!(existing.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(missing.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(
        header_str(&missing, header::ACCESS_CONTROL_ALLOW_ORIGIN),
        Some("*")
    );
}

#[tokio::test]
async fn test_missing_file_is_not_found() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/absent.mp4", None).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_paths_outside_the_root_are_not_found() {
    let outer = tempfile::tempdir().unwrap();
    std::fs::write(outer.path().join("secret.mp4"), b"secret").unwrap();
    let root = outer.path().join("media");
    std::fs::create_dir(&root).unwrap();

    for uri in ["/../secret.mp4", "/%2e%2e/secret.mp4", "/%2E%2E%2Fsecret.mp4"] {
        let response = send(router(&root), Method::GET, uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
    }
}

#[tokio::test]
async fn test_percent_encoded_names_are_decoded() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/my%20movie.mp4", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_len(response).await, 6);
}

#[tokio::test]
async fn test_options_preflight() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::OPTIONS, "/anything.txt", None).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        header_str(&response, header::ACCESS_CONTROL_ALLOW_METHODS),
        Some("GET, OPTIONS")
    );
    assert_eq!(
        header_str(&response, header::ACCESS_CONTROL_ALLOW_HEADERS),
        Some("Content-Type, Range")
    );
    assert_eq!(body_len(response).await, 0);
}

#[tokio::test]
async fn test_head_has_headers_and_no_body() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::HEAD, "/clip.mp4", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, header::CONTENT_LENGTH), Some("1000"));
    assert_eq!(body_len(response).await, 0);

    let response = send(router(dir.path()), Method::HEAD, "/clip.mp4", Some("bytes=0-9")).await;
    assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
    assert_eq!(
        header_str(&response, header::CONTENT_RANGE),
        Some("bytes 0-9/1000")
    );
    assert_eq!(body_len(response).await, 0);
}

#[tokio::test]
async fn test_other_methods_are_rejected() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::POST, "/clip.mp4", None).await;

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(
        header_str(&response, header::ALLOW),
        Some("GET, HEAD, OPTIONS")
    );
}

#[tokio::test]
async fn test_transcode_class_without_transcoder_fails() {
    let dir = media_dir();
    let response = send(router(dir.path()), Method::GET, "/film.mkv", None).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}
