use serde::{Deserialize, Serialize};
use serde_json::Value;

// -- JWT Claims --

/// Claims carried by bearer tokens when the server runs in JWT auth mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Messages --

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub peer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    pub id: String,
    pub from: String,
    pub to: String,
    pub text: String,
    pub ts: String,
}

#[derive(Debug, Deserialize)]
pub struct GroupHistoryQuery {
    pub group_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GroupHistoryEntry {
    pub id: String,
    pub from: String,
    #[serde(rename = "groupId")]
    pub group_id: String,
    pub text: String,
    pub ts: String,
}

#[derive(Debug, Serialize)]
pub struct GroupHistoryResponse {
    pub ok: bool,
    pub messages: Vec<GroupHistoryEntry>,
}

// -- Notifications --

#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: Value,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct UnreadCountResponse {
    pub ok: bool,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub ok: bool,
    pub unread: i64,
}

#[derive(Debug, Deserialize)]
pub struct ReadByMessageRequest {
    #[serde(rename = "messageId", default)]
    pub message_id: String,
}
