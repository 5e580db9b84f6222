//! Video routes: the public chronological feed, detail, and search.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::pagination;
use crate::response::Success;
use crate::AppState;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/video/feed", get(feed))
        .route("/video/detail", get(detail))
        .route("/search", get(search))
}

#[derive(Debug, Deserialize)]
struct FeedQuery {
    #[serde(default)]
    page_size: Option<i32>,
    #[serde(default)]
    latest_time: Option<i64>,
}

#[derive(Serialize)]
struct FeedRequest {
    user_id: i64,
    latest_time: i64,
    page_size: i32,
}

/// `GET /api/video/feed`: chronological feed, anonymous-friendly. The
/// personalised feed lives under `/api/auth/recommend/videos`; the two are
/// deliberately separate.
async fn feed(
    State(state): State<AppState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let (_, page_size) = pagination::normalize(None, query.page_size);
    let request = FeedRequest {
        user_id: 0,
        latest_time: query.latest_time.unwrap_or(0),
        page_size,
    };
    let data: Value = state
        .clients
        .client("video")?
        .call("get_feed", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Debug, Deserialize)]
struct DetailQuery {
    #[serde(default)]
    id: Option<i64>,
}

#[derive(Serialize)]
struct VideoDetailRequest {
    video_id: i64,
    current_user_id: i64,
}

/// `GET /api/video/detail?id=`: one video.
async fn detail(
    State(state): State<AppState>,
    query: Result<Query<DetailQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let video_id = query
        .id
        .ok_or_else(|| ApiError::bad_request("invalid video id"))?;
    let request = VideoDetailRequest {
        video_id,
        current_user_id: 0,
    };
    let data: Value = state
        .clients
        .client("video")?
        .call("get_video_detail", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    keyword: Option<String>,
    #[serde(default)]
    page: Option<i32>,
    #[serde(default)]
    page_size: Option<i32>,
}

#[derive(Serialize)]
struct SearchVideoRequest<'a> {
    keyword: &'a str,
    current_user_id: i64,
    page: i32,
    page_size: i32,
}

/// `GET /api/search`: reshapes the backend's `{videos, total_count}` into
/// `{videos, total, page, size}`.
async fn search(
    State(state): State<AppState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let (page, page_size) = pagination::normalize(query.page, query.page_size);
    let request = SearchVideoRequest {
        keyword: query.keyword.as_deref().unwrap_or(""),
        current_user_id: 0,
        page,
        page_size,
    };
    let data: Value = state
        .clients
        .client("video")?
        .call("search_video", &request, state.config.rpc_timeout)
        .await?;
    let data = serde_json::json!({
        "videos": data.get("videos").cloned().unwrap_or(Value::Null),
        "total": data.get("total_count").cloned().unwrap_or(Value::Null),
        "page": page,
        "size": page_size,
    });
    Ok(Success(Some(data)))
}
