use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use uuid::Uuid;

use parlor_types::events::ServerEvent;

/// Process-unique id of a single live connection.
pub type ConnId = Uuid;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("connection closed")]
    Closed,

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A live connection as seen by the hub and the dispatcher.
///
/// Implementations must serialize their own writes: two concurrent
/// `send_event` calls may never interleave on the wire.
pub trait Client: Send + Sync {
    fn id(&self) -> ConnId;

    fn user_id(&self) -> &str;

    fn send_event(&self, event: &ServerEvent) -> Result<(), ClientError>;

    /// Ask the transport to close. Idempotent.
    fn close(&self);
}

/// Frames queued for a connection's writer task.
#[derive(Debug)]
pub enum Outbound {
    Text(String),
    Close,
}

/// WebSocket-backed client. Sends never touch the socket directly; they are
/// queued and written in order by the connection's single writer task.
pub struct WsClient {
    id: ConnId,
    user_id: String,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl WsClient {
    /// Returns the client and the receiving end of its outbound queue.
    pub fn new(user_id: impl Into<String>) -> (Arc<Self>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            tx,
        });
        (client, rx)
    }
}

impl Client for WsClient {
    fn id(&self) -> ConnId {
        self.id
    }

    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn send_event(&self, event: &ServerEvent) -> Result<(), ClientError> {
        let text = serde_json::to_string(event)?;
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| ClientError::Closed)
    }

    fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }
}
