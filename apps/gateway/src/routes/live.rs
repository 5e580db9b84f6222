//! Live-room routes: the public room list and host start/stop.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::hub::frame;
use crate::middleware::auth::Principal;
use crate::pagination;
use crate::response::Success;
use crate::AppState;

pub fn public_router() -> Router<AppState> {
    Router::new().route("/live/list", get(list))
}

pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/live/start", post(start))
        .route("/live/stop", post(stop))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    page: Option<i32>,
    #[serde(default)]
    page_size: Option<i32>,
}

#[derive(Serialize)]
struct GetLiveRoomsRequest {
    user_id: i64,
    page: i32,
    page_size: i32,
}

/// `GET /api/live/list`: rooms currently live.
async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let (page, page_size) = pagination::normalize(query.page, query.page_size);
    let request = GetLiveRoomsRequest {
        user_id: 0,
        page,
        page_size,
    };
    let data: Value = state
        .clients
        .client("live")?
        .call("get_live_rooms", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Debug, Deserialize)]
struct StartBody {
    room_id: i64,
    rtmp_url: String,
}

#[derive(Serialize)]
struct StartLiveRequest<'a> {
    host_id: i64,
    room_id: i64,
    rtmp_url: &'a str,
}

/// `POST /api/auth/live/start`: viewers already in the room get a
/// `live_status` frame once the backend accepts.
async fn start(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<StartBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = StartLiveRequest {
        host_id: principal.user_id,
        room_id: body.room_id,
        rtmp_url: &body.rtmp_url,
    };
    let _: Value = state
        .clients
        .client("live")?
        .call("start_live", &request, state.config.rpc_timeout)
        .await?;
    state
        .hub
        .broadcast_room(body.room_id, frame::live_status(body.room_id, "live"));
    Ok(Success(None))
}

#[derive(Debug, Deserialize)]
struct StopBody {
    room_id: i64,
}

#[derive(Serialize)]
struct StopLiveRequest {
    host_id: i64,
    room_id: i64,
}

/// `POST /api/auth/live/stop`.
async fn stop(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<StopBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = StopLiveRequest {
        host_id: principal.user_id,
        room_id: body.room_id,
    };
    let _: Value = state
        .clients
        .client("live")?
        .call("stop_live", &request, state.config.rpc_timeout)
        .await?;
    state
        .hub
        .broadcast_room(body.room_id, frame::live_status(body.room_id, "finished"));
    Ok(Success(None))
}
