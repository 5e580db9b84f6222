//! Shared harness: a mock backend fleet behind `POST /rpc/{operation}` and a
//! gateway bound to an ephemeral port.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};

use clipstream_gateway::config::Config;
use clipstream_gateway::hub::Hub;
use clipstream_gateway::{routes, AppState};
use clipstream_rpc::ClientPool;

pub const SERVICES: &[&str] = &[
    "user",
    "video",
    "social",
    "interaction",
    "message",
    "live",
    "danmu",
    "recommend",
];

/// Outbound queue capacity the test gateway runs with.
pub const SEND_QUEUE_CAPACITY: usize = 8;

/// One mock process standing in for every backend service.
pub struct MockBackend {
    /// When set, `send_message`/`send_danmu` answer a business failure.
    pub fail_writes: AtomicBool,
    users: Mutex<HashMap<String, u64>>,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
}

impl MockBackend {
    fn new() -> Self {
        Self {
            fail_writes: AtomicBool::new(false),
            users: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn user_id(&self, username: &str) -> Option<u64> {
        self.users.lock().unwrap().get(username).copied()
    }

    fn user_id_or_create(&self, username: &str) -> u64 {
        *self
            .users
            .lock()
            .unwrap()
            .entry(username.to_string())
            .or_insert_with(|| self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

fn ok(data: Value) -> Json<Value> {
    Json(json!({ "status_code": 0, "msg": "", "data": data }))
}

fn fail(status_code: i64, msg: &str) -> Json<Value> {
    Json(json!({ "status_code": status_code, "msg": msg }))
}

async fn rpc(
    State(mock): State<Arc<MockBackend>>,
    Path(operation): Path<String>,
    Json(request): Json<Value>,
) -> Json<Value> {
    mock.calls.lock().unwrap().push(operation.clone());

    if mock.fail_writes.load(Ordering::Relaxed)
        && matches!(operation.as_str(), "send_message" | "send_danmu")
    {
        return fail(500, "backend write failed");
    }

    match operation.as_str() {
        "register" => {
            let username = request["username"].as_str().unwrap_or_default().to_string();
            let id = mock.user_id_or_create(&username);
            ok(json!({
                "user": { "id": id, "username": username },
                "token": format!("token-{username}"),
            }))
        }
        "login" => {
            let username = request["username"].as_str().unwrap_or_default().to_string();
            match mock.user_id(&username) {
                Some(id) => ok(json!({
                    "user": { "id": id, "username": username },
                    "token": format!("token-{username}"),
                })),
                None => fail(404, "user not found"),
            }
        }
        "verify_token" => {
            let token = request["token"].as_str().unwrap_or_default();
            match token
                .strip_prefix("token-")
                .and_then(|username| mock.user_id(username))
            {
                Some(id) => ok(json!({ "user_id": id })),
                None => fail(401, "invalid token"),
            }
        }
        "get_user_info" => ok(json!({ "id": request["user_id"], "username": "mock" })),
        "get_feed" => ok(json!({ "videos": [], "next_time": 0 })),
        "search_video" => ok(json!({ "videos": [], "total_count": 0 })),
        "send_message" => ok(json!({ "message_id": 1 })),
        "send_danmu" => ok(json!({ "danmu_id": 1 })),
        "get_comment_list" | "get_danmu_history" | "get_live_rooms" | "get_chat_history"
        | "get_recommend_videos" => ok(json!([])),
        _ => ok(Value::Null),
    }
}

async fn spawn_backend() -> (SocketAddr, Arc<MockBackend>) {
    let mock = Arc::new(MockBackend::new());
    let app = Router::new()
        .route("/rpc/{operation}", post(rpc))
        .with_state(mock.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock backend");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, mock)
}

pub struct TestGateway {
    pub addr: SocketAddr,
    pub hub: Hub,
    pub backend: Arc<MockBackend>,
}

impl TestGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, query: &str) -> String {
        format!("ws://{}/ws?{}", self.addr, query)
    }

    /// Poll until the hub holds exactly `expected` connections.
    pub async fn wait_for_connections(&self, expected: usize) {
        for _ in 0..400 {
            if self.hub.connection_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!(
            "hub never reached {expected} connections, at {}",
            self.hub.connection_count()
        );
    }
}

/// Start a gateway whose every listed service resolves to one mock backend.
pub async fn spawn_gateway_with(services: &[&str]) -> TestGateway {
    let (backend_addr, backend) = spawn_backend().await;
    let endpoints: HashMap<String, Vec<String>> = services
        .iter()
        .map(|s| (s.to_string(), vec![backend_addr.to_string()]))
        .collect();

    let config = Arc::new(Config {
        port: 0,
        registry_endpoints: Vec::new(),
        rpc_timeout: Duration::from_secs(2),
        shutdown_timeout: Duration::from_secs(2),
        send_queue_capacity: SEND_QUEUE_CAPACITY,
    });
    let hub = Hub::spawn(config.send_queue_capacity);
    let state = AppState {
        config,
        clients: ClientPool::with_static(endpoints),
        hub: hub.clone(),
    };

    let app = routes::router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind gateway");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestGateway { addr, hub, backend }
}

pub async fn spawn_gateway() -> TestGateway {
    spawn_gateway_with(SERVICES).await
}
