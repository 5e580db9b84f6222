//! The personalised feed, distinct from the public chronological one.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Extension, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::middleware::auth::Principal;
use crate::pagination;
use crate::response::Success;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/recommend/videos", get(videos))
}

#[derive(Debug, Deserialize)]
struct RecommendQuery {
    #[serde(default)]
    page_size: Option<i32>,
}

#[derive(Serialize)]
struct GetRecommendVideosRequest {
    user_id: i64,
    page_size: i32,
}

/// `GET /api/auth/recommend/videos`.
async fn videos(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    query: Result<Query<RecommendQuery>, QueryRejection>,
) -> Result<Success, ApiError> {
    let Query(query) = query?;
    let (_, page_size) = pagination::normalize(None, query.page_size);
    let request = GetRecommendVideosRequest {
        user_id: principal.user_id,
        page_size,
    };
    let data: Value = state
        .clients
        .client("recommend")?
        .call("get_recommend_videos", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}
