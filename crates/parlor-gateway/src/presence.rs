//! Global presence announcements.
//!
//! Presence is a public signal: every connected client hears every
//! online/offline transition, regardless of relationships.

use tracing::info;

use parlor_types::events::ServerEvent;

use crate::hub::Hub;

/// A change in whether a user has any live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    CameOnline,
    WentOffline,
}

impl Transition {
    pub fn is_online(self) -> bool {
        matches!(self, Self::CameOnline)
    }
}

pub fn presence_event(user_id: &str, transition: Transition) -> ServerEvent {
    ServerEvent::Presence {
        user_id: user_id.to_string(),
        online: transition.is_online(),
    }
}

impl Hub {
    /// Broadcast a transition to everyone. Called only after the registry
    /// lock has been released.
    pub(crate) async fn announce(&self, user_id: &str, transition: Transition) {
        info!(
            "{} is now {}",
            user_id,
            if transition.is_online() { "online" } else { "offline" }
        );
        self.broadcast_all(&presence_event(user_id, transition)).await;
    }

    /// Current online users, sorted for stable output.
    pub async fn presence_snapshot(&self) -> ServerEvent {
        let mut online = self.online_users().await;
        online.sort();
        ServerEvent::PresenceSnapshot { online }
    }
}
