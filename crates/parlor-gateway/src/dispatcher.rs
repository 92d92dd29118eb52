use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info, warn};

use parlor_db::{Store, blocking};
use parlor_types::events::{
    DirectMessageEvent, DmCommand, Envelope, GroupMessageCommand, GroupMessageEvent, ServerEvent,
    TypingCommand, wire_timestamp,
};

use crate::client::Client;
use crate::hub::Hub;
use crate::notify::Notifier;
use crate::policy::{DmGate, DmPolicy};

/// Why an envelope was rejected. Each variant maps to the `code` of the
/// error frame sent back to the originating connection.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("{0}")]
    BadJson(String),

    #[error("missing to/text")]
    MissingDmFields,

    #[error("cannot DM yourself")]
    SelfDm,

    #[error("Direct messages require a follow relationship")]
    DmDenied,

    #[error("missing groupId/text")]
    MissingGroupFields,

    #[error("You are not a member of this group")]
    NotMember,

    #[error("{0}")]
    UnsupportedType(String),

    #[error("{context}")]
    Store {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadJson(_) => "bad_json",
            Self::MissingDmFields | Self::SelfDm => "bad_dm",
            Self::DmDenied => "dm_denied",
            Self::MissingGroupFields => "bad_group_message",
            Self::NotMember => "not_member",
            Self::UnsupportedType(_) => "unsupported_type",
            Self::Store { .. } => "db_error",
        }
    }

    pub fn to_event(&self) -> ServerEvent {
        ServerEvent::error(self.code(), self.to_string())
    }

    fn store(context: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Store { context, source }
    }
}

/// Interprets envelopes from admitted connections and drives persistence,
/// fan-out and notifications.
#[derive(Clone)]
pub struct Dispatcher {
    hub: Hub,
    gate: DmGate,
    notifier: Notifier,
    store: Arc<dyn Store>,
}

impl Dispatcher {
    pub fn new(hub: Hub, store: Arc<dyn Store>, policy: DmPolicy) -> Self {
        Self {
            gate: DmGate::new(policy, store.clone()),
            notifier: Notifier::new(hub.clone(), store.clone()),
            hub,
            store,
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn policy(&self) -> &DmPolicy {
        self.gate.policy()
    }

    /// Register an authenticated connection and send it the greeting:
    /// hello, the presence snapshot and the pending follow request count.
    pub async fn admit(&self, client: Arc<dyn Client>) {
        let user_id = client.user_id().to_string();
        self.hub.add(client.clone()).await;

        send_direct(
            client.as_ref(),
            &ServerEvent::Hello {
                user_id: user_id.clone(),
            },
        );
        send_direct(client.as_ref(), &self.hub.presence_snapshot().await);

        match self.notifier.follow_requests_badge(&user_id).await {
            Ok(badge) => send_direct(client.as_ref(), &badge),
            Err(e) => warn!("Failed to count follow requests for {}: {:#}", user_id, e),
        }
    }

    /// Unregister a connection whose read loop has ended.
    pub async fn release(&self, client: &dyn Client) {
        self.hub.remove(client).await;
    }

    /// Handle one text frame. Rejections are reported to the sender as an
    /// error frame; nothing here ends the connection.
    pub async fn handle_text(&self, client: &dyn Client, text: &str) {
        let result = match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => self.dispatch(client, envelope).await,
            Err(e) => Err(DispatchError::BadJson(e.to_string())),
        };

        if let Err(e) = result {
            match &e {
                DispatchError::Store { context, source } => {
                    warn!("{} ({}): {}: {:#}", client.user_id(), client.id(), context, source)
                }
                other => warn!(
                    "{} ({}) rejected frame [{}]: {}",
                    client.user_id(),
                    client.id(),
                    other.code(),
                    other
                ),
            }
            send_direct(client, &e.to_event());
        }
    }

    pub async fn dispatch(&self, client: &dyn Client, envelope: Envelope) -> Result<(), DispatchError> {
        match envelope.kind.as_str() {
            "dm" => self.handle_dm(client, decode(envelope.data)?).await,
            "typing" => {
                self.handle_typing(client, decode(envelope.data)?).await;
                Ok(())
            }
            "group_message" => self.handle_group_message(client, decode(envelope.data)?).await,
            _ => Err(DispatchError::UnsupportedType(envelope.kind)),
        }
    }

    async fn handle_dm(&self, client: &dyn Client, cmd: DmCommand) -> Result<(), DispatchError> {
        let sender = client.user_id();
        if cmd.to.is_empty() || cmd.text.is_empty() {
            return Err(DispatchError::MissingDmFields);
        }
        if cmd.to == sender {
            return Err(DispatchError::SelfDm);
        }

        let allowed = self
            .gate
            .can_dm(sender, &cmd.to)
            .await
            .map_err(DispatchError::store("failed to check relationship"))?;
        if !allowed {
            return Err(DispatchError::DmDenied);
        }

        let message = {
            let store = self.store.clone();
            let (from, to, text) = (sender.to_string(), cmd.to.clone(), cmd.text);
            blocking(move || store.insert_direct_message(&from, &to, &text))
                .await
                .map_err(DispatchError::store("failed to save message"))?
        };

        let out = DirectMessageEvent::from(&message);
        let event = ServerEvent::Dm(out.clone());

        send_direct(client, &event);
        self.hub.send_to_user_except(sender, client.id(), &event).await;
        self.hub.send_to_user(&cmd.to, &event).await;
        debug!("{} -> {} dm {}", sender, cmd.to, out.id);

        let content = json!({
            "from": out.from,
            "text": out.text,
            "messageId": out.id,
            "ts": out.ts,
        });
        if let Err(e) = self.notifier.notify(&cmd.to, "dm", content).await {
            warn!("Failed to notify {} of dm {}: {:#}", cmd.to, out.id, e);
        }

        Ok(())
    }

    /// Typing indicators are best-effort: anything invalid or not permitted
    /// is dropped without telling anyone.
    async fn handle_typing(&self, client: &dyn Client, cmd: TypingCommand) {
        let sender = client.user_id();
        if cmd.to.is_empty() || cmd.to == sender {
            return;
        }

        match self.gate.can_dm(sender, &cmd.to).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                warn!("Typing check {} -> {} failed: {:#}", sender, cmd.to, e);
                return;
            }
        }

        let event = ServerEvent::Typing {
            from: sender.to_string(),
            to: cmd.to.clone(),
            ts: wire_timestamp(Utc::now()),
        };
        self.hub.send_to_user(&cmd.to, &event).await;
    }

    async fn handle_group_message(
        &self,
        client: &dyn Client,
        cmd: GroupMessageCommand,
    ) -> Result<(), DispatchError> {
        let sender = client.user_id();
        if cmd.group_id.is_empty() || cmd.text.is_empty() {
            return Err(DispatchError::MissingGroupFields);
        }

        let is_member = {
            let store = self.store.clone();
            let (user_id, group_id) = (sender.to_string(), cmd.group_id.clone());
            blocking(move || store.is_accepted_group_member(&user_id, &group_id))
                .await
                .map_err(DispatchError::store("failed to check group membership"))?
        };
        if !is_member {
            return Err(DispatchError::NotMember);
        }

        let message = {
            let store = self.store.clone();
            let (from, group_id, text) = (sender.to_string(), cmd.group_id.clone(), cmd.text);
            blocking(move || store.insert_group_message(&from, &group_id, &text))
                .await
                .map_err(DispatchError::store("failed to save group message"))?
        };

        let event = ServerEvent::GroupMessage(GroupMessageEvent::from(&message));
        send_direct(client, &event);
        self.hub.send_to_user_except(sender, client.id(), &event).await;

        let members = {
            let store = self.store.clone();
            let group_id = cmd.group_id.clone();
            blocking(move || store.group_member_ids(&group_id)).await
        };
        match members {
            Ok(members) => {
                for member in members.iter().filter(|m| m.as_str() != sender) {
                    self.hub.send_to_user(member, &event).await;
                }
                info!(
                    "{} -> group {} ({} members)",
                    sender,
                    cmd.group_id,
                    members.len()
                );
            }
            Err(e) => warn!(
                "Group {} message {} saved but member lookup failed: {:#}",
                cmd.group_id, message.id, e
            ),
        }

        Ok(())
    }
}

/// A missing `data` decodes as an empty payload so field checks report it.
fn decode<T: DeserializeOwned>(data: Value) -> Result<T, DispatchError> {
    let data = match data {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(data).map_err(|e| DispatchError::BadJson(e.to_string()))
}

/// Write to a single connection, ignoring failure like every other fan-out.
fn send_direct(client: &dyn Client, event: &ServerEvent) {
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
