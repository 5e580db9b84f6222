//! Bearer-token auth gate for the authenticated route group.
//!
//! Token validity is decided by the identity service; the gateway never
//! parses tokens itself, so the signing secret stays off the edge.

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::AppState;

/// The verified identity attached to a request after the gate accepts it.
#[derive(Debug, Clone, Copy)]
pub struct Principal {
    pub user_id: i64,
}

/// Rejection returned when the bearer token is missing or invalid.
pub struct AuthError {
    message: &'static str,
}

impl AuthError {
    fn new(message: &'static str) -> Self {
        Self { message }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "message": self.message })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct VerifyTokenRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct VerifyTokenData {
    user_id: i64,
}

/// Verify an `Authorization` header value against the identity service.
pub async fn verify_bearer(state: &AppState, header: &str) -> Result<Principal, AuthError> {
    let token = match header.split_once(' ') {
        Some(("Bearer", token)) => token,
        _ => {
            return Err(AuthError::new(
                "Authorization header format must be Bearer {token}",
            ))
        }
    };

    let client = state
        .clients
        .client("user")
        .map_err(|_| AuthError::new("invalid or expired token"))?;

    let data: VerifyTokenData = client
        .call(
            "verify_token",
            &VerifyTokenRequest { token },
            state.config.rpc_timeout,
        )
        .await
        .map_err(|err| {
            tracing::debug!(error = %err, "token verification failed");
            AuthError::new("invalid or expired token")
        })?;

    Ok(Principal {
        user_id: data.user_id,
    })
}

/// Middleware for the authenticated route group: reject unless a principal
/// verifies, then expose it through request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        Some(value) => value.to_owned(),
        None => return AuthError::new("Authorization header is required").into_response(),
    };

    match verify_bearer(&state, &header).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(err) => err.into_response(),
    }
}
