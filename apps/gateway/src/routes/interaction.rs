//! Interaction routes: likes, comments, and the public comment list.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::middleware::auth::Principal;
use crate::pagination;
use crate::response::Success;
use crate::AppState;

pub fn public_router() -> Router<AppState> {
    Router::new().route("/interaction/comments", get(comments))
}

pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/interaction/like", post(like))
        .route("/interaction/unlike", post(unlike))
        .route("/interaction/comment", post(comment))
}

#[derive(Debug, Deserialize)]
struct LikeBody {
    video_id: i64,
}

#[derive(Serialize)]
struct LikeActionRequest {
    user_id: i64,
    video_id: i64,
    action: bool,
}

async fn like(
    state: State<AppState>,
    principal: Extension<Principal>,
    body: Result<Json<LikeBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    like_action(state, principal, body, true).await
}

async fn unlike(
    state: State<AppState>,
    principal: Extension<Principal>,
    body: Result<Json<LikeBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    like_action(state, principal, body, false).await
}

async fn like_action(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<LikeBody>, JsonRejection>,
    action: bool,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = LikeActionRequest {
        user_id: principal.user_id,
        video_id: body.video_id,
        action,
    };
    let _: Value = state
        .clients
        .client("interaction")?
        .call("like_action", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(None))
}

#[derive(Debug, Deserialize)]
struct CommentBody {
    video_id: i64,
    content: String,
}

#[derive(Serialize)]
struct CommentActionRequest<'a> {
    user_id: i64,
    video_id: i64,
    content: &'a str,
}

/// `POST /api/auth/interaction/comment`: returns the created comment.
async fn comment(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<CommentBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = CommentActionRequest {
        user_id: principal.user_id,
        video_id: body.video_id,
        content: &body.content,
    };
    let data: Value = state
        .clients
        .client("interaction")?
        .call("comment_action", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Debug, Deserialize)]
struct CommentsQuery {
    #[serde(default)]
    video_id: Option<i64>,
    #[serde(default)]
    page: Option<i32>,
    #[serde(default)]
    page_size: Option<i32>,
}

#[derive(Serialize)]
struct CommentListRequest {
    video_id: i64,
    page: i32,
    page_size: i32,
}

/// `GET /api/interaction/comments?video_id=`: public comment list.
async fn comments(
    State(state): State<AppState>,
    query: Result<Query<CommentsQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let video_id = query
        .video_id
        .ok_or_else(|| ApiError::bad_request("invalid video id"))?;
    let (page, page_size) = pagination::normalize(query.page, query.page_size);
    let request = CommentListRequest {
        video_id,
        page,
        page_size,
    };
    let data: Value = state
        .clients
        .client("interaction")?
        .call("get_comment_list", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}
