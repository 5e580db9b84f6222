//! Direct-message routes.

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

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/message/send", post(send))
        .route("/message/list", get(list))
}

#[derive(Debug, Deserialize)]
struct SendBody {
    receiver_id: i64,
    content: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    sender_id: i64,
    receiver_id: i64,
    content: &'a str,
}

/// `POST /api/auth/message/send`: returns `{message_id}`.
async fn send(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<SendBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = SendMessageRequest {
        sender_id: principal.user_id,
        receiver_id: body.receiver_id,
        content: &body.content,
    };
    let data: Value = state
        .clients
        .client("message")?
        .call("send_message", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    other_user_id: Option<i64>,
}

#[derive(Serialize)]
struct ChatHistoryRequest {
    user_id1: i64,
    user_id2: i64,
}

/// `GET /api/auth/message/list?other_user_id=`: the conversation between
/// the caller and one other user.
async fn list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let request = ChatHistoryRequest {
        user_id1: principal.user_id,
        user_id2: query.other_user_id.unwrap_or(0),
    };
    let data: Value = state
        .clients
        .client("message")?
        .call("get_chat_history", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}
