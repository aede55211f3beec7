//! WebSocket upgrade handler and per-connection event loop.

use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{ConnectInfo, RawQuery, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::AppState;

use super::connection::Frame;
use super::router::GatewayStats;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/gateway/stats", get(stats))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    RawQuery(query): RawQuery,
    ConnectInfo(remote_addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, query, remote_addr))
}

async fn stats(State(state): State<AppState>) -> Json<GatewayStats> {
    Json(state.gateway.stats())
}

async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    query: Option<String>,
    remote_addr: SocketAddr,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<Frame>(state.config.outbound_queue_capacity);

    let gateway = state.gateway.clone();
    let connection = gateway.connect(query.as_deref(), remote_addr, out_tx);

    // Writer: drain the outbound queue into the socket so a slow peer only
    // ever backs up its own queue.
    let writer_conn_id = connection.id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(frame) = out_rx.recv().await {
            if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                tracing::debug!(conn_id = %writer_conn_id, "ws write failed");
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Reader: frames from one connection are handled strictly in order.
    let close_reason = loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        gateway.handle_text(&connection, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break frame.map(|f| format!("{} {}", f.code, f.reason.as_str()));
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(conn_id = %connection.id, "ignoring binary frame");
                    }
                    None => break None,
                    Some(Err(e)) => {
                        tracing::debug!(?e, conn_id = %connection.id, "ws read error");
                        break Some("read error".to_string());
                    }
                }
            }

            _ = &mut writer => {
                break Some("writer stopped".to_string());
            }
        }
    };

    gateway.disconnect(&connection, close_reason.as_deref()).await;
    writer.abort();
}
