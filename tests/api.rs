//! API endpoint integration tests

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures::StreamExt;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;
use wake_listener::api::ApiServer;

mod common;
use common::harness;

async fn call(router: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    // Extractor rejections are plain text
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn health_reports_version() {
    let h = harness();
    let router = ApiServer::router(h.bridge.clone());

    let (status, body) = call(&router, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn start_with_empty_credential_reports_reason() {
    let h = harness();
    let router = ApiServer::router(h.bridge.clone());

    let (status, body) = call(
        &router,
        post_json("/wake/start", &serde_json::json!({ "credential": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({ "ok": false, "reason": "empty_credential" }));

    let (_, body) = call(&router, post("/wake/start")).await;
    assert_eq!(body["reason"], "empty_credential");
}

#[tokio::test]
async fn start_status_stop_round() {
    let h = harness();
    let router = ApiServer::router(h.bridge.clone());

    let (_, body) = call(
        &router,
        post_json("/wake/credential", &serde_json::json!({ "credential": "K1" })),
    )
    .await;
    assert_eq!(body, serde_json::json!({ "ok": true }));

    let (_, body) = call(
        &router,
        post_json("/wake/start", &serde_json::json!({ "credential": "K1" })),
    )
    .await;
    assert_eq!(body, serde_json::json!({ "ok": true }));

    let (_, body) = call(&router, get("/wake/running")).await;
    assert_eq!(body, serde_json::json!({ "running": true }));

    let (_, body) = call(&router, get("/wake/status")).await;
    assert_eq!(body, serde_json::json!({ "state": "listening", "enabled": true }));

    let (_, body) = call(&router, post("/wake/stop")).await;
    assert_eq!(body["ok"], true);

    let (_, body) = call(&router, get("/wake/status")).await;
    assert_eq!(body, serde_json::json!({ "state": "stopped", "enabled": false }));
}

#[tokio::test]
async fn activation_endpoint_clears_flag() {
    let h = harness();
    let router = ApiServer::router(h.bridge.clone());

    let (_, body) = call(&router, post("/wake/activation")).await;
    assert_eq!(body["activated"], false);

    h.handle.start(common::key("K1")).await.unwrap();
    assert!(h.engine.fire());

    let (_, body) = call(&router, post("/wake/activation")).await;
    assert_eq!(body["activated"], true);
    let (_, body) = call(&router, post("/wake/activation")).await;
    assert_eq!(body["activated"], false);
}

#[tokio::test]
async fn credential_endpoint_requires_body() {
    let h = harness();
    let router = ApiServer::router(h.bridge.clone());

    let (status, _) = call(&router, post("/wake/credential")).await;
    assert!(status.is_client_error());
}

#[tokio::test]
async fn unknown_route_is_404() {
    let h = harness();
    let router = ApiServer::router(h.bridge.clone());

    let (status, _) = call(&router, get("/wake/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn serve(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/wake/events"))
        .await
        .unwrap();
    socket
}

async fn next_frame(socket: &mut Socket) -> Option<Message> {
    tokio::time::timeout(Duration::from_millis(500), socket.next())
        .await
        .ok()
        .flatten()
        .map(Result::unwrap)
}

async fn wait_for_subscriber(h: &common::Harness) {
    for _ in 0..200 {
        if h.events.has_subscriber() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("event socket never subscribed");
}

#[tokio::test]
async fn event_socket_pushes_one_frame_per_detection() {
    let h = harness();
    let addr = serve(ApiServer::router(h.bridge.clone())).await;
    h.handle.start(common::key("K1")).await.unwrap();

    let mut socket = connect(addr).await;
    wait_for_subscriber(&h).await;

    assert!(h.engine.fire());
    assert!(h.engine.fire());

    for _ in 0..2 {
        let Some(Message::Text(text)) = next_frame(&mut socket).await else {
            panic!("expected a text frame");
        };
        let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(frame["event"], "wake_word_detected");
        assert_eq!(frame["keywordIndex"], 0);
        assert!(frame["timestamp"].is_string());
    }

    assert!(
        tokio::time::timeout(Duration::from_millis(50), socket.next())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn new_event_socket_closes_previous_one() {
    let h = harness();
    let addr = serve(ApiServer::router(h.bridge.clone())).await;
    h.handle.start(common::key("K1")).await.unwrap();

    let mut first = connect(addr).await;
    wait_for_subscriber(&h).await;
    let mut second = connect(addr).await;

    assert!(matches!(next_frame(&mut first).await, Some(Message::Close(_))));

    assert!(h.engine.fire());
    let Some(Message::Text(text)) = next_frame(&mut second).await else {
        panic!("expected a text frame on the newer socket");
    };
    let frame: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(frame["keywordIndex"], 0);
}
