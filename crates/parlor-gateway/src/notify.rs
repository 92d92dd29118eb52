use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;

use parlor_db::{Store, blocking};
use parlor_types::events::ServerEvent;

use crate::hub::Hub;

/// Persists notifications and keeps badge counts on live clients current.
#[derive(Clone)]
pub struct Notifier {
    hub: Hub,
    store: Arc<dyn Store>,
}

impl Notifier {
    pub fn new(hub: Hub, store: Arc<dyn Store>) -> Self {
        Self { hub, store }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Store a notification for `recipient`, push it, then push the fresh
    /// unread count. Returns the notification id.
    pub async fn notify(&self, recipient: &str, kind: &str, content: Value) -> Result<i64> {
        let id = {
            let store = self.store.clone();
            let (recipient, kind, content) = (recipient.to_string(), kind.to_string(), content.clone());
            blocking(move || store.insert_notification(&recipient, &kind, &content)).await?
        };

        self.hub
            .send_to_user(
                recipient,
                &ServerEvent::NotificationCreated {
                    id,
                    kind: kind.to_string(),
                    content,
                },
            )
            .await;

        self.push_unread_badge(recipient).await?;
        Ok(id)
    }

    /// Recompute the unread count and push it to every connection of `user_id`.
    pub async fn push_unread_badge(&self, user_id: &str) -> Result<i64> {
        let count = {
            let store = self.store.clone();
            let user_id = user_id.to_string();
            blocking(move || store.unread_count(&user_id)).await?
        };
        self.hub
            .send_to_user(user_id, &ServerEvent::UnreadBadge { count })
            .await;
        Ok(count)
    }

    /// Pending follow requests addressed to `user_id`, as a badge event.
    pub async fn follow_requests_badge(&self, user_id: &str) -> Result<ServerEvent> {
        let store = self.store.clone();
        let user_id = user_id.to_string();
        let count = blocking(move || store.pending_follow_request_count(&user_id)).await?;
        Ok(ServerEvent::FollowRequestsBadge { count })
    }
}
