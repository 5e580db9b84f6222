//! Panic recovery: a downstream panic becomes a logged 500 instead of a
//! dropped connection. Wired as the outermost layer via
//! `tower_http::catch_panic::CatchPanicLayer::custom(handle_panic)`.

use std::any::Any;
use std::backtrace::Backtrace;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "non-string panic payload".to_string()
    };
    let backtrace = Backtrace::force_capture();
    tracing::error!(%detail, %backtrace, "request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "message": "server error" })),
    )
        .into_response()
}
