//! WebSocket wire frames: the `{type, content}` envelope and its typed
//! contents.

use axum::extract::ws::Utf8Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const TYPE_CHAT: &str = "chat";
pub const TYPE_DANMU: &str = "danmu";
pub const TYPE_NOTIFICATION: &str = "notification";
pub const TYPE_LIVE_STATUS: &str = "live_status";

/// The outer shape of every hub frame, inbound and outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
}

impl WsEnvelope {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Re-encode for fan-out. The content is passed through untouched, so
    /// receivers see exactly what the sender put inside it.
    pub fn to_frame(&self) -> Utf8Bytes {
        serde_json::to_string(self).unwrap().into()
    }
}

/// Inbound `chat` content.
#[derive(Debug, Deserialize)]
pub struct ChatContent {
    pub receiver_id: i64,
    pub content: String,
}

/// Inbound `danmu` content.
#[derive(Debug, Deserialize)]
pub struct DanmuContent {
    pub live_id: i64,
    pub content: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
}

/// Build a `notification` frame addressed to one user.
pub fn notification(recipient_id: i64, payload: Value) -> Utf8Bytes {
    WsEnvelope {
        kind: TYPE_NOTIFICATION.to_string(),
        content: serde_json::json!({ "recipient_id": recipient_id, "payload": payload }),
    }
    .to_frame()
}

/// Build a `live_status` frame for a room.
pub fn live_status(live_id: i64, state: &str) -> Utf8Bytes {
    WsEnvelope {
        kind: TYPE_LIVE_STATUS.to_string(),
        content: serde_json::json!({ "live_id": live_id, "state": state }),
    }
    .to_frame()
}
