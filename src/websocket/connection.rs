use crate::protocol::{ConnectionId, ErrorCode, ServerMessage};
use crate::server::{BrokerHandle, Outbound};
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use super::sending::{write_outbound, SocketSink, WriteState};

pub(super) async fn handle_socket(socket: WebSocket, broker: BrokerHandle, addr: SocketAddr) {
    let connection_id: ConnectionId = Uuid::new_v4();
    let (mut sender, receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Outbound>(broker.config().outbound_queue_capacity.max(1));

    if let Err(err) = broker.connect(connection_id, tx.clone(), addr).await {
        tracing::error!(%connection_id, client_addr = %addr, error = %err, "Rejecting WebSocket connection");
        broker.metrics().decrement_active_connections();
        let _ = sender.close().await;
        return;
    }
    tracing::info!(%connection_id, client_addr = %addr, "WebSocket connection established");

    let mut send_task = tokio::spawn(write_loop(sender, rx, connection_id));
    let mut receive_task = tokio::spawn(read_loop(receiver, broker.clone(), tx, connection_id));

    tokio::select! {
        _ = &mut send_task => receive_task.abort(),
        _ = &mut receive_task => send_task.abort(),
    }

    if broker.disconnect(connection_id).await.is_err() {
        tracing::debug!(%connection_id, "Broker stopped before disconnect was delivered");
    }
    tracing::info!(%connection_id, client_addr = %addr, "WebSocket connection closed");
}

async fn write_loop(
    mut sender: SocketSink,
    mut rx: mpsc::Receiver<Outbound>,
    connection_id: ConnectionId,
) {
    while let Some(frame) = rx.recv().await {
        if write_outbound(&mut sender, frame, &connection_id).await == WriteState::Finished {
            break;
        }
    }
    let _ = sender.close().await;
}

async fn read_loop(
    mut receiver: SplitStream<WebSocket>,
    broker: BrokerHandle,
    tx: mpsc::Sender<Outbound>,
    connection_id: ConnectionId,
) {
    let max_size = broker.config().max_message_size;

    while let Some(incoming) = receiver.next().await {
        let message = match incoming {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%connection_id, "WebSocket error: {}", e);
                break;
            }
        };

        let text = match message {
            Message::Text(text) => text.as_str().to_owned(),
            Message::Binary(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Message::Pong(_) => {
                if broker.liveness_ack(connection_id).await.is_err() {
                    break;
                }
                continue;
            }
            // axum answers pings itself
            Message::Ping(_) => continue,
            Message::Close(_) => break,
        };

        if text.len() > max_size {
            tracing::warn!(
                %connection_id,
                size = text.len(),
                max = max_size,
                "Message exceeds size limit"
            );
            reject_oversized(&broker, &tx, connection_id, text.len(), max_size);
            continue;
        }

        if broker.frame(connection_id, text).await.is_err() {
            tracing::warn!(%connection_id, "Broker unavailable; closing connection");
            break;
        }
    }
}

fn reject_oversized(
    broker: &BrokerHandle,
    tx: &mpsc::Sender<Outbound>,
    connection_id: ConnectionId,
    size: usize,
    max_size: usize,
) {
    broker.metrics().increment_protocol_errors();
    let error = ServerMessage::error(
        ErrorCode::MessageTooLarge,
        format!("Message too large ({size} bytes, max {max_size} bytes)"),
    );
    if let Err(err) = tx.try_send(Outbound::Message(Arc::new(error))) {
        if matches!(err, TrySendError::Full(_)) {
            broker.metrics().increment_deliveries_dropped();
        }
        tracing::warn!(%connection_id, error = %err, "Failed to enqueue size limit error");
    }
}
