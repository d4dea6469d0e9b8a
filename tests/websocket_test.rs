use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tower::ServiceExt;
use video_progress_backend::config::AppConfig;
use video_progress_backend::services::storage::{LocalStorageService, StorageService};
use video_progress_backend::{AppState, create_app};

const BOUNDARY: &str = "---------------------------123456789012345678901234567";

async fn serve(dir: &std::path::Path) -> (SocketAddr, axum::Router, AppState) {
    let config = AppConfig::development(dir);
    let storage: Arc<dyn StorageService> = Arc::new(LocalStorageService::new(dir));
    let state = AppState::new(config, storage);
    let app = create_app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = app.clone();
    tokio::spawn(async move {
        axum::serve(listener, server).await.unwrap();
    });

    (addr, app, state)
}

fn upload_request(content: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{boundary}\r\n\
        Content-Disposition: form-data; name=\"video\"; filename=\"clip.mp4\"\r\n\
        Content-Type: video/mp4\r\n\r\n",
        boundary = BOUNDARY
    )
    .into_bytes();
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn wait_for_subscribers(state: &AppState, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while state.broadcaster.subscriber_count() != expected {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("subscriber count never settled");
}

#[tokio::test]
async fn test_socket_receives_progress_frames_until_safe() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, app, state) = serve(dir.path()).await;

    let (mut socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    wait_for_subscribers(&state, 1).await;

    let response = app.clone().oneshot(upload_request(b"clip")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let mut frames: Vec<Value> = Vec::new();
    while frames.len() < 5 {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a progress frame")
            .expect("socket closed early")
            .unwrap();
        if let Message::Text(_) = &message {
            frames.push(serde_json::from_str(message.to_text().unwrap()).unwrap());
        }
    }

    assert!(frames.iter().all(|f| f["event"] == "progress"));
    let progress: Vec<u64> = frames
        .iter()
        .map(|f| f["data"]["progress"].as_u64().unwrap())
        .collect();
    assert_eq!(progress, vec![20, 40, 60, 80, 100]);
    assert!(frames[..4].iter().all(|f| f["data"]["status"] == "processing"));
    assert_eq!(frames[4]["data"]["status"], "safe");

    let id = &frames[0]["data"]["id"];
    assert!(frames.iter().all(|f| &f["data"]["id"] == id));

    socket.close(None).await.unwrap();
}

#[tokio::test]
async fn test_client_close_ends_the_connection() {
    let dir = tempfile::tempdir().unwrap();
    let (addr, _app, state) = serve(dir.path()).await;

    let (mut socket, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    wait_for_subscribers(&state, 1).await;

    socket.send(Message::Close(None)).await.unwrap();

    // The stream must finish: either the server's close reply, an error, or EOF.
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(Ok(message)) = socket.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await
    .expect("connection did not end after close");

    wait_for_subscribers(&state, 0).await;
}
