//! Realtime core: connection registry, presence, DM policy, notification
//! fan-out and the per-connection protocol dispatcher.

pub mod client;
pub mod connection;
pub mod dispatcher;
pub mod hub;
pub mod notify;
pub mod policy;
pub mod presence;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{Client, ClientError, ConnId, WsClient};
pub use dispatcher::{DispatchError, Dispatcher};
pub use hub::Hub;
pub use notify::Notifier;
pub use policy::{DmGate, DmPolicy};
