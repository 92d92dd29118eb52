use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::{DirectMessage, GroupMessage};

/// Format a timestamp the way every event on the wire carries it.
pub fn wire_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// -- Client -> server --

/// Raw frame read off the socket. `data` stays opaque until the type is known.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DmCommand {
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TypingCommand {
    #[serde(default)]
    pub to: String,
}

/// Older clients send `group_id`; both spellings are accepted.
#[derive(Debug, Clone, Deserialize)]
pub struct GroupMessageCommand {
    #[serde(default, rename = "groupId", alias = "group_id")]
    pub group_id: String,
    #[serde(default)]
    pub text: String,
}

// -- Server -> client --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectMessageEvent {
    pub id: String,
    pub from: String,
    pub to: String,
    pub text: String,
    pub ts: String,
}

impl From<&DirectMessage> for DirectMessageEvent {
    fn from(msg: &DirectMessage) -> Self {
        Self {
            id: msg.id.to_string(),
            from: msg.sender.clone(),
            to: msg.receiver.clone(),
            text: msg.text.clone(),
            ts: wire_timestamp(msg.sent_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMessageEvent {
    pub id: String,
    pub from: String,
    #[serde(rename = "groupId")]
    pub group_id: String,
    pub text: String,
    pub ts: String,
}

impl From<&GroupMessage> for GroupMessageEvent {
    fn from(msg: &GroupMessage) -> Self {
        Self {
            id: msg.id.to_string(),
            from: msg.sender.clone(),
            group_id: msg.group_id.clone(),
            text: msg.text.clone(),
            ts: wire_timestamp(msg.sent_at),
        }
    }
}

/// Events pushed over the realtime socket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Sent once, right after the connection is admitted
    #[serde(rename = "hello", rename_all = "camelCase")]
    Hello { user_id: String },

    /// Everyone online at admission time
    #[serde(rename = "presence_snapshot")]
    PresenceSnapshot { online: Vec<String> },

    /// A user came online or went offline
    #[serde(rename = "presence", rename_all = "camelCase")]
    Presence { user_id: String, online: bool },

    #[serde(rename = "dm")]
    Dm(DirectMessageEvent),

    /// Ephemeral, never persisted
    #[serde(rename = "typing")]
    Typing { from: String, to: String, ts: String },

    #[serde(rename = "group_message")]
    GroupMessage(GroupMessageEvent),

    #[serde(rename = "notification.created")]
    NotificationCreated {
        id: i64,
        #[serde(rename = "type")]
        kind: String,
        content: Value,
    },

    #[serde(rename = "badge.unread")]
    UnreadBadge { count: i64 },

    #[serde(rename = "badge.follow_requests")]
    FollowRequestsBadge { count: i64 },

    #[serde(rename = "error")]
    Error { code: String, message: String },
}

impl ServerEvent {
    /// Wire tag of the event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "hello",
            Self::PresenceSnapshot { .. } => "presence_snapshot",
            Self::Presence { .. } => "presence",
            Self::Dm(_) => "dm",
            Self::Typing { .. } => "typing",
            Self::GroupMessage(_) => "group_message",
            Self::NotificationCreated { .. } => "notification.created",
            Self::UnreadBadge { .. } => "badge.unread",
            Self::FollowRequestsBadge { .. } => "badge.follow_requests",
            Self::Error { .. } => "error",
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }
}
