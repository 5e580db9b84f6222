//! The uniform JSON envelope every dispatcher response is wrapped in.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `{code, message, data?}`: `code` mirrors the HTTP status so clients can
/// read either field. `data` is present only on success.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Envelope {
    pub fn success(data: Option<Value>) -> Self {
        Self {
            code: StatusCode::OK.as_u16(),
            message: "success".to_string(),
            data,
        }
    }

    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

/// Successful handler result; failures travel as `crate::error::ApiError`.
pub struct Success(pub Option<Value>);

impl IntoResponse for Success {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(Envelope::success(self.0))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_with_data() {
        let envelope = Envelope::success(Some(serde_json::json!({"user": {"id": 7}})));
        let text = serde_json::to_string(&envelope).unwrap();
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back, envelope);
        assert_eq!(back.code, 200);
        assert_eq!(back.message, "success");
    }

    #[test]
    fn data_key_is_omitted_when_absent() {
        let envelope = Envelope::error(StatusCode::SERVICE_UNAVAILABLE, "video service unavailable");
        let text = serde_json::to_string(&envelope).unwrap();
        assert!(!text.contains("data"));
        let back: Envelope = serde_json::from_str(&text).unwrap();
        assert_eq!(back.code, 503);
        assert!(back.data.is_none());
    }
}
