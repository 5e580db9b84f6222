//! User routes: registration, login, profile, and profile updates.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::middleware::auth::Principal;
use crate::response::Success;
use crate::AppState;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/user/register", post(register))
        .route("/user/login", post(login))
}

pub fn auth_router() -> Router<AppState> {
    Router::new()
        .route("/user/profile", get(profile))
        .route("/user/update", put(update))
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    username: String,
    password: String,
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    about: Option<String>,
}

#[derive(Serialize)]
struct RegisterRequest<'a> {
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    about: Option<&'a str>,
}

/// `POST /api/user/register`: forwards to the user service, returns
/// `{user, token}`.
async fn register(
    State(state): State<AppState>,
    body: Result<Json<RegisterBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = RegisterRequest {
        username: &body.username,
        password: &body.password,
        avatar: body.avatar.as_deref().filter(|s| !s.is_empty()),
        about: body.about.as_deref().filter(|s| !s.is_empty()),
    };
    let data: Value = state
        .clients
        .client("user")?
        .call("register", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Debug, Deserialize, Serialize)]
struct LoginBody {
    username: String,
    password: String,
}

/// `POST /api/user/login`: returns `{user, token}`.
async fn login(
    State(state): State<AppState>,
    body: Result<Json<LoginBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let data: Value = state
        .clients
        .client("user")?
        .call("login", &body, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Serialize)]
struct UserInfoRequest {
    user_id: i64,
    current_user_id: i64,
}

/// `GET /api/auth/user/profile`: the caller's own profile.
async fn profile(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Success, ApiError> {
    let request = UserInfoRequest {
        user_id: principal.user_id,
        current_user_id: principal.user_id,
    };
    let data: Value = state
        .clients
        .client("user")?
        .call("get_user_info", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(Some(data)))
}

#[derive(Debug, Deserialize)]
struct UpdateBody {
    #[serde(default)]
    avatar: Option<String>,
    #[serde(default)]
    about: Option<String>,
    #[serde(default)]
    old_password: Option<String>,
    #[serde(default)]
    new_password: Option<String>,
}

#[derive(Serialize)]
struct UpdateUserRequest<'a> {
    user_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    avatar: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    about: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    old_password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    new_password: Option<&'a str>,
}

/// `PUT /api/auth/user/update`: empty fields are left untouched.
async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    body: Result<Json<UpdateBody>, JsonRejection>,
) -> Result<Success, ApiError> {
    let Json(body) = body?;
    let request = UpdateUserRequest {
        user_id: principal.user_id,
        avatar: body.avatar.as_deref().filter(|s| !s.is_empty()),
        about: body.about.as_deref().filter(|s| !s.is_empty()),
        old_password: body.old_password.as_deref().filter(|s| !s.is_empty()),
        new_password: body.new_password.as_deref().filter(|s| !s.is_empty()),
    };
    let _: Value = state
        .clients
        .client("user")?
        .call("update_user", &request, state.config.rpc_timeout)
        .await?;
    Ok(Success(None))
}
