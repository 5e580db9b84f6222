//! WebSocket upgrade handling and the per-connection reader/writer tasks.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::middleware::auth;
use crate::AppState;

use super::connection::{Connection, ConnectionRx};
use super::frame::{ChatContent, DanmuContent, WsEnvelope, TYPE_CHAT, TYPE_DANMU};
use super::Hub;

/// Upper bound on the goodbye close frame; a stalled peer does not get to
/// delay teardown.
const CLOSE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Default, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub live_id: Option<i64>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_upgrade))
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    // A presented token must verify, and the verified id wins over the query
    // parameter. An anonymous upgrade keeps the query-parameter identity.
    let user_id = match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(header) => match auth::verify_bearer(&state, header).await {
            Ok(principal) => principal.user_id,
            Err(err) => return err.into_response(),
        },
        None => query.user_id.unwrap_or(0),
    };
    let live_id = query.live_id.unwrap_or(0);

    ws.on_upgrade(move |socket| handle_connection(socket, state, user_id, live_id))
}

async fn handle_connection(socket: WebSocket, state: AppState, user_id: i64, live_id: i64) {
    let (ws_tx, ws_rx) = socket.split();
    let (conn, rx) = state.hub.connect(user_id, live_id);

    tracing::info!(conn_id = conn.id, user_id, live_id, "websocket connected");

    let closed = conn.closed_signal();
    let writer = tokio::spawn(write_loop(ws_tx, rx, state.hub.clone(), conn.clone()));
    let reader = tokio::spawn(read_loop(ws_rx, state.clone(), conn.clone(), closed));

    // Whatever ended the reader (close frame, I/O error, eviction, panic),
    // this teardown request is absorbed if it already happened.
    let _ = reader.await;
    state.hub.unregister(conn.id);
    let _ = writer.await;

    tracing::info!(conn_id = conn.id, user_id, "websocket closed");
}

/// The connection's only socket writer: drains the frame queue in enqueue
/// order. Every write races the closed signal, so teardown interrupts even
/// a write stalled on a full socket.
async fn write_loop(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut rx: ConnectionRx,
    hub: Hub,
    conn: Arc<Connection>,
) {
    loop {
        tokio::select! {
            frame = rx.frames.recv() => match frame {
                Some(frame) => {
                    tokio::select! {
                        result = ws_tx.send(Message::Text(frame)) => {
                            if result.is_err() {
                                hub.unregister(conn.id);
                                break;
                            }
                        }
                        _ = rx.closed.changed() => break,
                    }
                }
                None => break,
            },
            _ = rx.closed.changed() => break,
        }
    }
    // Best-effort close frame; dropping both halves closes the socket anyway.
    let _ = tokio::time::timeout(CLOSE_TIMEOUT, ws_tx.send(Message::Close(None))).await;
}

async fn read_loop(
    mut ws_rx: SplitStream<WebSocket>,
    state: AppState,
    conn: Arc<Connection>,
    mut closed: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            message = ws_rx.next() => match message {
                Some(Ok(Message::Text(text))) => handle_inbound(&state, &conn, text.as_str()).await,
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Close(_))) | None => break,
                // Binary frames are not part of the protocol.
                Some(Ok(_)) => continue,
                Some(Err(err)) => {
                    tracing::debug!(conn_id = conn.id, error = %err, "websocket read error");
                    break;
                }
            },
            _ = closed.changed() => break,
        }
    }
}

/// Route one inbound frame. A malformed frame only costs itself; the
/// connection lives on.
async fn handle_inbound(state: &AppState, conn: &Connection, text: &str) {
    let envelope = match WsEnvelope::parse(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::debug!(conn_id = conn.id, error = %err, "malformed frame dropped");
            return;
        }
    };

    match envelope.kind.as_str() {
        TYPE_CHAT => handle_chat(state, conn, envelope),
        TYPE_DANMU => handle_danmu(state, conn, envelope),
        other => {
            tracing::warn!(conn_id = conn.id, kind = other, "unknown frame type dropped");
        }
    }
}

#[derive(Serialize)]
struct SendMessageRequest {
    sender_id: i64,
    receiver_id: i64,
    content: String,
}

/// The persist RPC and the fan-out run independently; neither waits on the
/// other, and a failed RPC never suppresses delivery.
fn handle_chat(state: &AppState, conn: &Connection, envelope: WsEnvelope) {
    let chat: ChatContent = match serde_json::from_value(envelope.content.clone()) {
        Ok(chat) => chat,
        Err(err) => {
            tracing::debug!(conn_id = conn.id, error = %err, "malformed chat content dropped");
            return;
        }
    };

    spawn_rpc(
        state,
        "message",
        "send_message",
        SendMessageRequest {
            sender_id: conn.user_id,
            receiver_id: chat.receiver_id,
            content: chat.content,
        },
    );

    state.hub.broadcast_user(chat.receiver_id, envelope.to_frame());
}

#[derive(Serialize)]
struct SendDanmuRequest {
    user_id: i64,
    live_id: i64,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<i32>,
}

fn handle_danmu(state: &AppState, conn: &Connection, envelope: WsEnvelope) {
    let danmu: DanmuContent = match serde_json::from_value(envelope.content.clone()) {
        Ok(danmu) => danmu,
        Err(err) => {
            tracing::debug!(conn_id = conn.id, error = %err, "malformed danmu content dropped");
            return;
        }
    };

    spawn_rpc(
        state,
        "danmu",
        "send_danmu",
        SendDanmuRequest {
            user_id: conn.user_id,
            live_id: danmu.live_id,
            content: danmu.content,
            color: danmu.color.filter(|c| !c.is_empty()),
            position: danmu.position.filter(|p| *p > 0),
        },
    );

    state.hub.broadcast_room(danmu.live_id, envelope.to_frame());
}

/// Fire a backend RPC on its own task; failures are logged, never returned.
fn spawn_rpc<Req>(state: &AppState, service: &'static str, operation: &'static str, request: Req)
where
    Req: Serialize + Send + Sync + 'static,
{
    let clients = state.clients.clone();
    let deadline = state.config.rpc_timeout;
    tokio::spawn(async move {
        let result = match clients.client(service) {
            Ok(client) => client
                .call::<_, serde_json::Value>(operation, &request, deadline)
                .await
                .map(|_| ()),
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            tracing::warn!(service, operation, error = %err, "backend rpc failed");
        }
    });
}
