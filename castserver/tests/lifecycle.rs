use std::time::Duration;

use castserver::{MediaServer, MediaServerOptions};

fn options() -> MediaServerOptions {
    MediaServerOptions {
        port: 0,
        advertised_host: "127.0.0.1".to_string(),
        shutdown_grace: Duration::from_secs(1),
    }
}

fn media_dir(content: &[u8]) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("clip.mp4"), content).unwrap();
    dir
}

#[tokio::test]
async fn test_start_serves_the_directory() {
    let dir = media_dir(b"first");
    let server = MediaServer::new(options(), None);

    let base = server.start(dir.path()).await.unwrap();
    assert!(base.starts_with("http://127.0.0.1:"));
    assert!(server.is_running().await);

    let body = reqwest::get(format!("{}/clip.mp4", base))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&body[..], b"first");

    server.stop().await;
    assert!(!server.is_running().await);
    assert_eq!(server.base_url().await, None);
}

#[tokio::test]
async fn test_same_root_is_a_no_op() {
    let dir = media_dir(b"x");
    let server = MediaServer::new(options(), None);

    let first = server.start(dir.path()).await.unwrap();
    let addr = server.local_addr().await;
    let second = server.start(dir.path()).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(server.local_addr().await, addr);
    server.stop().await;
}

#[tokio::test]
async fn test_new_root_replaces_the_session() {
    let first_dir = media_dir(b"first");
    let second_dir = media_dir(b"second");
    let server = MediaServer::new(options(), None);

    server.start(first_dir.path()).await.unwrap();
    let second = server.start(second_dir.path()).await.unwrap();
    assert_eq!(
        server.root_dir().await,
        Some(std::fs::canonicalize(second_dir.path()).unwrap())
    );

    let body = reqwest::get(format!("{}/clip.mp4", second))
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    assert_eq!(&body[..], b"second");
    server.stop().await;
}

#[tokio::test]
async fn test_missing_root_is_an_error() {
    let server = MediaServer::new(options(), None);
    let missing = std::env::temp_dir().join("castify-no-such-directory");

    assert!(server.start(&missing).await.is_err());
    assert!(!server.is_running().await);
}

#[tokio::test]
async fn test_stop_without_session() {
    let server = MediaServer::new(options(), None);
    server.stop().await;
    assert!(!server.is_running().await);
}
