mod common;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn connect_ws(gw: &common::TestGateway, user_id: i64, live_id: i64) -> WsClient {
    let url = gw.ws_url(&format!("user_id={user_id}&live_id={live_id}"));
    let (stream, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    stream
}

async fn recv_json(stream: &mut WsClient) -> Value {
    let message = time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timed out waiting for a frame")
        .expect("stream ended")
        .expect("ws read error");
    let text = message.into_text().expect("not a text frame");
    serde_json::from_str(text.as_str()).expect("frame is not json")
}

async fn assert_silent(stream: &mut WsClient) {
    let result = time::timeout(Duration::from_millis(300), stream.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

/// Read until the server closes the socket; panics if it stays open.
async fn expect_close(stream: &mut WsClient) {
    loop {
        match time::timeout(Duration::from_secs(5), stream.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return,
            Ok(Some(Ok(_))) => continue,
            Err(_) => panic!("socket never closed"),
        }
    }
}

#[tokio::test]
async fn danmu_fans_out_to_room_peers_only() {
    let gw = common::spawn_gateway().await;
    let mut sender = connect_ws(&gw, 1, 42).await;
    let mut peer = connect_ws(&gw, 2, 42).await;
    let mut outsider = connect_ws(&gw, 3, 99).await;
    gw.wait_for_connections(3).await;

    sender
        .send(Message::Text(
            json!({
                "type": "danmu",
                "content": { "live_id": 42, "content": "hi", "color": "#FFFFFF" }
            })
            .to_string()
            .into(),
        ))
        .await
        .expect("send danmu");

    let frame = recv_json(&mut peer).await;
    assert_eq!(frame["type"], "danmu");
    assert_eq!(frame["content"]["live_id"], 42);
    assert_eq!(frame["content"]["content"], "hi");
    assert_eq!(frame["content"]["color"], "#FFFFFF");

    // The sender sits in the same room and hears its own danmu.
    let echo = recv_json(&mut sender).await;
    assert_eq!(echo["content"]["content"], "hi");

    assert_silent(&mut outsider).await;
}

#[tokio::test]
async fn chat_reaches_every_device_of_the_receiver() {
    let gw = common::spawn_gateway().await;
    let mut sender = connect_ws(&gw, 1, 0).await;
    let mut phone = connect_ws(&gw, 7, 0).await;
    let mut laptop = connect_ws(&gw, 7, 0).await;
    gw.wait_for_connections(3).await;

    sender
        .send(Message::Text(
            json!({
                "type": "chat",
                "content": { "receiver_id": 7, "content": "hello there" }
            })
            .to_string()
            .into(),
        ))
        .await
        .expect("send chat");

    for device in [&mut phone, &mut laptop] {
        let frame = recv_json(device).await;
        assert_eq!(frame["type"], "chat");
        assert_eq!(frame["content"]["content"], "hello there");
    }

    // Chat goes to the receiver's connections, not back to the sender.
    assert_silent(&mut sender).await;
}

#[tokio::test]
async fn failing_backend_rpc_does_not_suppress_fanout() {
    let gw = common::spawn_gateway().await;
    gw.backend
        .fail_writes
        .store(true, std::sync::atomic::Ordering::Relaxed);

    let mut sender = connect_ws(&gw, 1, 42).await;
    let mut peer = connect_ws(&gw, 2, 42).await;
    gw.wait_for_connections(2).await;

    sender
        .send(Message::Text(
            json!({
                "type": "danmu",
                "content": { "live_id": 42, "content": "still here" }
            })
            .to_string()
            .into(),
        ))
        .await
        .expect("send danmu");

    let frame = recv_json(&mut peer).await;
    assert_eq!(frame["content"]["content"], "still here");

    // The persist RPC was still attempted, concurrently with the fan-out.
    for _ in 0..100 {
        if gw.backend.calls().iter().any(|op| op == "send_danmu") {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("send_danmu rpc was never issued");
}

#[tokio::test]
async fn malformed_frames_cost_only_themselves() {
    let gw = common::spawn_gateway().await;
    let mut sender = connect_ws(&gw, 1, 42).await;
    let mut peer = connect_ws(&gw, 2, 42).await;
    gw.wait_for_connections(2).await;

    sender
        .send(Message::Text("not json at all".into()))
        .await
        .expect("send garbage");
    sender
        .send(Message::Text(
            json!({ "type": "mystery", "content": {} }).to_string().into(),
        ))
        .await
        .expect("send unknown type");

    // The connection survives both and keeps working.
    sender
        .send(Message::Text(
            json!({
                "type": "danmu",
                "content": { "live_id": 42, "content": "alive" }
            })
            .to_string()
            .into(),
        ))
        .await
        .expect("send danmu");

    let frame = recv_json(&mut peer).await;
    assert_eq!(frame["content"]["content"], "alive");
    assert_eq!(gw.hub.connection_count(), 2);
}

#[tokio::test]
async fn slow_consumer_is_evicted_and_its_socket_closed() {
    let gw = common::spawn_gateway().await;
    let (mut sender_tx, sender_rx) = connect_ws(&gw, 1, 5).await.split();
    let mut peer = connect_ws(&gw, 2, 5).await;
    gw.wait_for_connections(2).await;

    // Drain the sender's own echoes so only the peer backs up.
    tokio::spawn(async move {
        let mut rx = sender_rx;
        while let Some(Ok(_)) = rx.next().await {}
    });

    // The peer never reads. Large frames fill its socket buffers, then its
    // bounded queue, and the overflow evicts it.
    let payload = "x".repeat(32 * 1024);
    for _ in 0..256 {
        let sent = sender_tx
            .send(Message::Text(
                json!({
                    "type": "danmu",
                    "content": { "live_id": 5, "content": payload }
                })
                .to_string()
                .into(),
            ))
            .await;
        if sent.is_err() {
            break;
        }
        if gw.hub.connection_count() == 1 {
            break;
        }
    }

    for _ in 0..400 {
        if gw.hub.connection_count() == 1 {
            break;
        }
        time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(gw.hub.connection_count(), 1, "slow peer was not evicted");

    expect_close(&mut peer).await;
}

#[tokio::test]
async fn verified_token_overrides_the_query_identity() {
    let gw = common::spawn_gateway().await;

    let body: Value = reqwest::Client::new()
        .post(gw.url("/api/user/register"))
        .json(&json!({ "username": "bob", "password": "p" }))
        .send()
        .await
        .expect("register")
        .json()
        .await
        .expect("register body");
    let bob_id = body["data"]["user"]["id"].as_i64().unwrap();
    let token = body["data"]["token"].as_str().unwrap().to_string();

    // Bob upgrades claiming to be user 999; the verified token wins.
    let mut request = gw
        .ws_url("user_id=999&live_id=0")
        .into_client_request()
        .expect("request");
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {token}").parse().expect("header value"),
    );
    let (mut bob, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("ws connect");

    let mut sender = connect_ws(&gw, 1, 0).await;
    gw.wait_for_connections(2).await;

    sender
        .send(Message::Text(
            json!({
                "type": "chat",
                "content": { "receiver_id": bob_id, "content": "to bob" }
            })
            .to_string()
            .into(),
        ))
        .await
        .expect("send chat");

    let frame = recv_json(&mut bob).await;
    assert_eq!(frame["content"]["content"], "to bob");
}

#[tokio::test]
async fn invalid_token_rejects_the_upgrade() {
    let gw = common::spawn_gateway().await;

    let mut request = gw
        .ws_url("user_id=1&live_id=0")
        .into_client_request()
        .expect("request");
    request.headers_mut().insert(
        "Authorization",
        "Bearer bogus".parse().expect("header value"),
    );
    let result = tokio_tungstenite::connect_async(request).await;

    match result {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected an HTTP 401 rejection, got {other:?}"),
    }
}

#[tokio::test]
async fn live_start_pushes_a_status_frame_to_the_room() {
    let gw = common::spawn_gateway().await;
    let mut viewer = connect_ws(&gw, 5, 77).await;
    gw.wait_for_connections(1).await;

    let body: Value = reqwest::Client::new()
        .post(gw.url("/api/user/register"))
        .json(&json!({ "username": "host", "password": "p" }))
        .send()
        .await
        .expect("register")
        .json()
        .await
        .expect("register body");
    let token = body["data"]["token"].as_str().unwrap().to_string();

    let resp = reqwest::Client::new()
        .post(gw.url("/api/auth/live/start"))
        .header("Authorization", format!("Bearer {token}"))
        .json(&json!({ "room_id": 77, "rtmp_url": "rtmp://ingest/77" }))
        .send()
        .await
        .expect("start live");
    assert_eq!(resp.status(), 200);

    let frame = recv_json(&mut viewer).await;
    assert_eq!(frame["type"], "live_status");
    assert_eq!(frame["content"]["live_id"], 77);
    assert_eq!(frame["content"]["state"], "live");
}

#[tokio::test]
async fn hub_shutdown_closes_every_socket() {
    let gw = common::spawn_gateway().await;
    let mut a = connect_ws(&gw, 1, 42).await;
    let mut b = connect_ws(&gw, 2, 42).await;
    gw.wait_for_connections(2).await;

    gw.hub.shutdown(Duration::from_secs(2)).await;
    assert_eq!(gw.hub.connection_count(), 0);

    expect_close(&mut a).await;
    expect_close(&mut b).await;
}
