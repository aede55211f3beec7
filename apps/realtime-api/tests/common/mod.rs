use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use futures_util::{SinkExt, StreamExt};
use tokio::time;
use tokio_tungstenite::tungstenite;

use realtime_api::config::Config;
use realtime_api::gateway::router::GatewayStats;
use realtime_api::AppState;

pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Build a test AppState with a fixed notification prefix.
pub fn test_state() -> AppState {
    AppState::new(Config {
        notification_prefix: "New comment: ".to_string(),
        ..Config::default()
    })
}

/// Build the full application router wired to a fresh test state.
pub fn test_app() -> (Router, AppState) {
    let state = test_state();
    let app = realtime_api::routes::router().with_state(state.clone());
    (app, state)
}

/// Start an actual TCP server for WebSocket testing. The server runs in the
/// background for the rest of the test.
pub async fn start_ws_server() -> (SocketAddr, AppState) {
    let (app, state) = test_app();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (addr, state)
}

/// Open a gateway WebSocket. `query` includes the leading `?` when present.
pub async fn connect(addr: SocketAddr, query: &str) -> WsStream {
    let url = format!("ws://{addr}/ws{query}");
    let (ws_stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws_stream
}

pub async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    send_text(ws, &value.to_string()).await;
}

pub async fn send_text(ws: &mut WsStream, text: &str) {
    ws.send(tungstenite::Message::Text(text.to_string().into()))
        .await
        .expect("send");
}

/// Read the next text frame as JSON, skipping control frames.
pub async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");

        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("frame is JSON");
        }
    }
}

/// Assert that no frame arrives within a short window.
pub async fn expect_silence(ws: &mut WsStream) {
    let result = time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "unexpected frame: {result:?}");
}

/// Poll the gateway until `pred` holds. Registration happens on the server
/// side after the client handshake returns, so tests wait for it.
pub async fn wait_for(state: &AppState, pred: impl Fn(&GatewayStats) -> bool) {
    for _ in 0..200 {
        if pred(&state.gateway.stats()) {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "gateway never reached the expected state: {:?}",
        state.gateway.stats()
    );
}
