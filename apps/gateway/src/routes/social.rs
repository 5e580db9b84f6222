//! Social routes: follow/unfollow and the two relation lists.

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

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/social/follow", post(follow))
        .route("/social/unfollow", post(unfollow))
        .route("/social/following", get(following))
        .route("/social/follower", get(follower))
}

#[derive(Debug, Deserialize)]
struct FollowBody {
    target_user_id: i64,
}

#[derive(Serialize)]
struct FollowActionRequest {
    user_id: i64,
    target_user_id: i64,
    /// `true` follows, `false` unfollows; one backend operation serves both.
    action: bool,
}

async fn follow(
    state: State<AppState>,
    principal: Extension<Principal>,
    body: Result<Json<FollowBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    follow_action(state, principal, body, true).await
}

async fn unfollow(
    state: State<AppState>,
    principal: Extension<Principal>,
    body: Result<Json<FollowBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    follow_action(state, principal, body, false).await
}

async fn follow_action(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<FollowBody>, JsonRejection>,
    action: bool,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = FollowActionRequest {
        user_id: principal.user_id,
        target_user_id: body.target_user_id,
        action,
    };
    let _: Value = state
        .clients
        .client("social")?
        .call("follow_action", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(None))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    page: Option<i32>,
    #[serde(default)]
    page_size: Option<i32>,
}

#[derive(Serialize)]
struct FollowListRequest {
    user_id: i64,
    page: i32,
    page_size: i32,
}

/// `GET /api/auth/social/following`: who the caller follows.
async fn following(
    state: State<AppState>,
    principal: Extension<Principal>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    relation_list(state, principal, query, "get_follow_list").await
}

/// `GET /api/auth/social/follower`: who follows the caller.
async fn follower(
    state: State<AppState>,
    principal: Extension<Principal>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    relation_list(state, principal, query, "get_follower_list").await
}

async fn relation_list(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<ListQuery>, QueryRejection>,
    operation: &'static str,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let (page, page_size) = pagination::normalize(query.page, query.page_size);
    let request = FollowListRequest {
        user_id: principal.user_id,
        page,
        page_size,
    };
    let data: Value = state
        .clients
        .client("social")?
        .call(operation, &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}
