use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::debug;

use parlor_types::events::ServerEvent;

use crate::client::{Client, ConnId};
use crate::presence::Transition;

type ConnectionSet = HashMap<ConnId, Arc<dyn Client>>;

/// Registry of live connections, keyed by user.
///
/// A user is online iff it has an entry; entries are never left empty.
/// Fan-out copies the target handles under the read lock and sends after
/// releasing it, so a slow client never holds up registration.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    /// user_id -> (conn_id -> connection)
    clients: RwLock<HashMap<String, ConnectionSet>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection. The user's first connection announces them online.
    pub async fn add(&self, client: Arc<dyn Client>) {
        let user_id = client.user_id().to_string();

        let first = {
            let mut clients = self.inner.clients.write().await;
            let set = clients.entry(user_id.clone()).or_default();
            let first = set.is_empty();
            set.insert(client.id(), client);
            first
        };

        if first {
            self.announce(&user_id, Transition::CameOnline).await;
        }
    }

    /// Unregister a connection. The user's last connection announces them offline.
    pub async fn remove(&self, client: &dyn Client) {
        let user_id = client.user_id();

        let last = {
            let mut clients = self.inner.clients.write().await;
            match clients.get_mut(user_id) {
                Some(set) => {
                    set.remove(&client.id());
                    if set.is_empty() {
                        clients.remove(user_id);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if last {
            self.announce(user_id, Transition::WentOffline).await;
        }
    }

    /// Deliver to every connection of `user_id`. No-op if the user is offline.
    pub async fn send_to_user(&self, user_id: &str, event: &ServerEvent) {
        let targets = self.connections_of(user_id, None).await;
        deliver(&targets, event);
    }

    /// Like `send_to_user`, skipping one connection (usually the originator,
    /// which already got a direct echo).
    pub async fn send_to_user_except(&self, user_id: &str, except: ConnId, event: &ServerEvent) {
        let targets = self.connections_of(user_id, Some(except)).await;
        deliver(&targets, event);
    }

    /// Deliver to every connection of every user.
    pub async fn broadcast_all(&self, event: &ServerEvent) {
        let targets: Vec<Arc<dyn Client>> = {
            let clients = self.inner.clients.read().await;
            clients
                .values()
                .flat_map(|set| set.values().cloned())
                .collect()
        };
        deliver(&targets, event);
    }

    /// Snapshot of users with at least one live connection.
    pub async fn online_users(&self) -> Vec<String> {
        self.inner.clients.read().await.keys().cloned().collect()
    }

    pub async fn is_online(&self, user_id: &str) -> bool {
        self.inner
            .clients
            .read()
            .await
            .get(user_id)
            .is_some_and(|set| !set.is_empty())
    }

    pub async fn connection_count(&self) -> usize {
        self.inner.clients.read().await.values().map(|set| set.len()).sum()
    }

    async fn connections_of(&self, user_id: &str, except: Option<ConnId>) -> Vec<Arc<dyn Client>> {
        let clients = self.inner.clients.read().await;
        match clients.get(user_id) {
            Some(set) => set
                .iter()
                .filter(|(id, _)| Some(**id) != except)
                .map(|(_, client)| client.clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

/// Best-effort send. A failed write is logged and otherwise ignored; it does
/// not deregister the connection (only the read loop does that).
fn deliver(targets: &[Arc<dyn Client>], event: &ServerEvent) {
    for client in targets {
        if let Err(e) = client.send_event(event) {
            debug!(
                "Dropped {} for {} ({}): {}",
                event.kind(),
                client.user_id(),
                client.id(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingClient;

    #[tokio::test]
    async fn online_iff_connections_exist() {
        let hub = Hub::new();
        let a1 = RecordingClient::new("alice");
        let a2 = RecordingClient::new("alice");

        assert!(!hub.is_online("alice").await);

        hub.add(a1.clone()).await;
        hub.add(a2.clone()).await;
        assert!(hub.is_online("alice").await);
        assert_eq!(hub.connection_count().await, 2);

        hub.remove(a1.as_ref()).await;
        assert!(hub.is_online("alice").await);

        hub.remove(a2.as_ref()).await;
        assert!(!hub.is_online("alice").await);
        assert!(hub.online_users().await.is_empty());
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test]
    async fn removing_unknown_connection_is_noop() {
        let hub = Hub::new();
        let ghost = RecordingClient::new("ghost");
        hub.remove(ghost.as_ref()).await;
        assert!(hub.online_users().await.is_empty());
    }

    #[tokio::test]
    async fn send_to_user_reaches_every_connection_of_that_user_only() {
        let hub = Hub::new();
        let a1 = RecordingClient::new("alice");
        let a2 = RecordingClient::new("alice");
        let b = RecordingClient::new("bob");
        hub.add(a1.clone()).await;
        hub.add(a2.clone()).await;
        hub.add(b.clone()).await;
        for c in [&a1, &a2, &b] {
            c.take();
        }

        hub.send_to_user("alice", &ServerEvent::UnreadBadge { count: 4 }).await;

        assert_eq!(a1.take(), vec![ServerEvent::UnreadBadge { count: 4 }]);
        assert_eq!(a2.take(), vec![ServerEvent::UnreadBadge { count: 4 }]);
        assert!(b.take().is_empty());
    }

    #[tokio::test]
    async fn send_to_offline_user_is_noop() {
        let hub = Hub::new();
        let b = RecordingClient::new("bob");
        hub.add(b.clone()).await;
        b.take();

        hub.send_to_user("nobody", &ServerEvent::UnreadBadge { count: 1 }).await;
        assert!(b.take().is_empty());
    }

    #[tokio::test]
    async fn send_to_user_except_skips_one_connection() {
        let hub = Hub::new();
        let a1 = RecordingClient::new("alice");
        let a2 = RecordingClient::new("alice");
        hub.add(a1.clone()).await;
        hub.add(a2.clone()).await;
        a1.take();
        a2.take();

        hub.send_to_user_except("alice", a1.id(), &ServerEvent::UnreadBadge { count: 1 })
            .await;
        assert!(a1.take().is_empty());
        assert_eq!(a2.take().len(), 1);
    }

    #[tokio::test]
    async fn failed_write_does_not_affect_siblings_or_registration() {
        let hub = Hub::new();
        let broken = RecordingClient::broken("alice");
        let healthy = RecordingClient::new("alice");
        hub.add(broken.clone()).await;
        hub.add(healthy.clone()).await;
        healthy.take();

        hub.broadcast_all(&ServerEvent::UnreadBadge { count: 9 }).await;

        assert_eq!(healthy.take(), vec![ServerEvent::UnreadBadge { count: 9 }]);
        assert_eq!(hub.connection_count().await, 2);
    }

    #[tokio::test]
    async fn online_users_is_a_copy() {
        let hub = Hub::new();
        let a = RecordingClient::new("alice");
        hub.add(a.clone()).await;

        let snapshot = hub.online_users().await;
        hub.remove(a.as_ref()).await;

        assert_eq!(snapshot, vec!["alice".to_string()]);
        assert!(hub.online_users().await.is_empty());
    }

    fn presence_for(watcher: &RecordingClient, user: &str) -> Vec<bool> {
        watcher
            .events()
            .iter()
            .filter_map(|e| match e {
                ServerEvent::Presence { user_id, online } if user_id == user => Some(*online),
                _ => None,
            })
            .collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_connects_then_disconnects_announce_once_per_user() {
        const USERS: [&str; 4] = ["u0", "u1", "u2", "u3"];
        const TASKS: usize = 16;

        let hub = Hub::new();
        let watcher = RecordingClient::new("watcher");
        hub.add(watcher.clone()).await;
        watcher.take();

        let mut handles = Vec::new();
        for _ in 0..TASKS {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                let mut opened = Vec::new();
                for user in USERS {
                    let client = RecordingClient::new(user);
                    hub.add(client.clone()).await;
                    opened.push(client);
                    tokio::task::yield_now().await;
                }
                opened
            }));
        }
        let mut opened = Vec::new();
        for handle in handles {
            opened.push(handle.await.unwrap());
        }

        assert_eq!(hub.connection_count().await, TASKS * USERS.len() + 1);
        for user in USERS {
            assert!(hub.is_online(user).await);
        }

        let mut handles = Vec::new();
        for clients in opened {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                for client in clients.iter().rev() {
                    hub.remove(client.as_ref()).await;
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(hub.connection_count().await, 1);
        assert_eq!(hub.online_users().await, vec!["watcher".to_string()]);
        for user in USERS {
            assert_eq!(presence_for(&watcher, user), vec![true, false], "presence of {}", user);
        }

        hub.remove(watcher.as_ref()).await;
        assert_eq!(hub.connection_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn churn_never_leaves_empty_entries() {
        const USERS: [&str; 3] = ["u0", "u1", "u2"];

        let hub = Hub::new();
        let watcher = RecordingClient::new("watcher");
        hub.add(watcher.clone()).await;
        watcher.take();

        let checker = {
            let hub = hub.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    {
                        let clients = hub.inner.clients.read().await;
                        assert!(clients.values().all(|set| !set.is_empty()));
                    }
                    tokio::task::yield_now().await;
                }
            })
        };

        let mut handles = Vec::new();
        for task in 0..12 {
            let hub = hub.clone();
            handles.push(tokio::spawn(async move {
                let user = USERS[task % USERS.len()];
                for _ in 0..50 {
                    let client = RecordingClient::new(user);
                    hub.add(client.clone()).await;
                    tokio::task::yield_now().await;
                    hub.remove(client.as_ref()).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        checker.await.unwrap();

        assert_eq!(hub.connection_count().await, 1);
        for user in USERS {
            assert!(!hub.is_online(user).await);
            // Announcements can land out of order across tasks, but every
            // online transition is matched by exactly one offline one.
            let seen = presence_for(&watcher, user);
            let up = seen.iter().filter(|online| **online).count();
            assert!(up >= 1);
            assert_eq!(up * 2, seen.len(), "unbalanced presence for {}", user);
        }
    }
}
