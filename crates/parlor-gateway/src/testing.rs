use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use parlor_db::Database;
use parlor_types::events::ServerEvent;
use parlor_types::models::FollowStatus;

use crate::client::{Client, ClientError, ConnId};

/// Client double that records every event it is sent.
pub struct RecordingClient {
    id: ConnId,
    user_id: String,
    events: Mutex<Vec<ServerEvent>>,
    closed: AtomicBool,
    broken: bool,
}

impl RecordingClient {
    pub fn new(user_id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            broken: false,
        })
    }

    /// A client whose every write fails.
    pub fn broken(user_id: &str) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            events: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            broken: true,
        })
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn take(&self) -> Vec<ServerEvent> {
        std::mem::take(&mut *self.events.lock().unwrap())
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.kind()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Client for RecordingClient {
    fn id(&self) -> ConnId {
        self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn send_event(&self, event: &ServerEvent) -> Result<(), ClientError> {
        if self.broken {
            return Err(ClientError::Closed);
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// In-memory database with a handful of users.
pub fn seeded_db() -> Arc<Database> {
    let db = Database::open_in_memory().unwrap();
    for id in ["alice", "bob", "carol", "dave"] {
        db.create_user(id, id).unwrap();
    }
    Arc::new(db)
}

pub fn follow(db: &Database, follower: &str, following: &str) {
    db.set_follow_status(follower, following, FollowStatus::Accepted)
        .unwrap();
}
