//! Danmu routes: the public history list and the HTTP send path. The
//! realtime send path lives on the WebSocket hub.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::middleware::auth::Principal;
use crate::response::Success;
use crate::AppState;

pub fn public_router() -> Router<AppState> {
    Router::new().route("/danmu/list", get(list))
}

pub fn auth_router() -> Router<AppState> {
    Router::new().route("/danmu/send", post(send))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    live_id: Option<i64>,
}

#[derive(Serialize)]
struct GetDanmuHistoryRequest {
    live_id: i64,
}

/// `GET /api/danmu/list?live_id=`: history for one room.
async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let live_id = query
        .live_id
        .ok_or_else(|| ApiError::bad_request("invalid live id"))?;
    let request = GetDanmuHistoryRequest { live_id };
    let data: Value = state
        .clients
        .client("danmu")?
        .call("get_danmu_history", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Debug, Deserialize)]
struct SendBody {
    live_id: i64,
    content: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    position: Option<i32>,
}

#[derive(Serialize)]
struct SendDanmuRequest<'a> {
    user_id: i64,
    live_id: i64,
    content: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<i32>,
}

/// `POST /api/auth/danmu/send`: returns `{danmu_id}`.
async fn send(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<SendBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = SendDanmuRequest {
        user_id: principal.user_id,
        live_id: body.live_id,
        content: &body.content,
        color: body.color.as_deref().filter(|c| !c.is_empty()),
        position: body.position.filter(|p| *p > 0),
    };
    let data: Value = state
        .clients
        .client("danmu")?
        .call("send_danmu", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}
