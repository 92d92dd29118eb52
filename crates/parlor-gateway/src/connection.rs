use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::client::{Client, Outbound, WsClient};
use crate::dispatcher::Dispatcher;

/// How long the writer may keep flushing after the read loop ends.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Drive an authenticated WebSocket until the peer goes away.
///
/// Frames from one connection are handled strictly in arrival order. Only
/// the end of the read loop unregisters the connection; a failed write just
/// stops the writer.
pub async fn handle_connection(socket: WebSocket, dispatcher: Dispatcher, user_id: String) {
    let (sender, mut receiver) = socket.split();
    let (client, outbound) = WsClient::new(user_id.clone());
    let conn_id = client.id();

    let mut writer = tokio::spawn(run_writer(sender, outbound));
    dispatcher.admit(client.clone()).await;
    info!(
        "{} ({}) connected, {} live",
        user_id,
        conn_id,
        dispatcher.hub().connection_count().await
    );

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => dispatcher.handle_text(client.as_ref(), text.as_str()).await,
            Ok(Message::Binary(data)) => {
                debug!("{} ({}) sent {} byte binary frame, ignored", user_id, conn_id, data.len())
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("{} ({}) read error: {}", user_id, conn_id, e);
                break;
            }
        }
    }

    dispatcher.release(client.as_ref()).await;
    client.close();
    if tokio::time::timeout(WRITER_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }

    info!(
        "{} ({}) disconnected, {} live",
        user_id,
        conn_id,
        dispatcher.hub().connection_count().await
    );
}

/// Single writer for the socket: drains the outbound queue in order.
async fn run_writer(
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = outbound.recv().await {
        match frame {
            Outbound::Text(text) => {
                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Outbound::Close => {
                let _ = sender.close().await;
                break;
            }
        }
    }
}
