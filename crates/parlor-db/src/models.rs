//! Database row types. These map directly to SQLite rows.
//! Converted into parlor-types models at the query boundary.

use chrono::{DateTime, Utc};
use parlor_types::models::{DirectMessage, GroupMessage, Notification};
use serde_json::Value;
use tracing::warn;

use crate::{parse_timestamp, try_parse_timestamp};

pub struct MessageRow {
    pub id: i64,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub sent_at: String,
}

pub struct GroupMessageRow {
    pub id: i64,
    pub group_id: String,
    pub sender_id: String,
    pub content: String,
    pub sent_at: String,
}

pub struct NotificationRow {
    pub id: i64,
    pub recipient_id: String,
    pub kind: String,
    pub content: String,
    pub is_read: bool,
    pub created_at: String,
}

pub struct SessionRow {
    pub user_id: String,
    pub expires_at: String,
}

impl SessionRow {
    /// Unreadable expiry values count as already expired.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        try_parse_timestamp(&self.expires_at).is_none_or(|at| at <= now)
    }
}

impl MessageRow {
    pub fn into_model(self) -> DirectMessage {
        DirectMessage {
            id: self.id,
            sender: self.sender_id,
            receiver: self.receiver_id,
            text: self.content,
            sent_at: parse_timestamp(&self.sent_at),
        }
    }
}

impl GroupMessageRow {
    pub fn into_model(self) -> GroupMessage {
        GroupMessage {
            id: self.id,
            sender: self.sender_id,
            group_id: self.group_id,
            text: self.content,
            sent_at: parse_timestamp(&self.sent_at),
        }
    }
}

impl NotificationRow {
    pub fn into_model(self) -> Notification {
        let content = serde_json::from_str(&self.content).unwrap_or_else(|e| {
            warn!("Corrupt content on notification {}: {}", self.id, e);
            Value::Null
        });
        Notification {
            id: self.id,
            recipient: self.recipient_id,
            kind: self.kind,
            content,
            is_read: self.is_read,
            created_at: parse_timestamp(&self.created_at),
        }
    }
}
