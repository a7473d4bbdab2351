use crate::protocol::ConnectionId;
use crate::server::Outbound;
use axum::body::Bytes;
use axum::extract::ws::{close_code, CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::SinkExt;

pub(super) type SocketSink = SplitSink<WebSocket, Message>;

/// Whether the writer should keep draining the queue after a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum WriteState {
    Open,
    Finished,
}

/// Encode one queue item as a WebSocket frame.
///
/// Returns `None` only when a protocol message fails to serialize; the item is
/// skipped and the connection kept.
pub(super) fn encode_outbound(frame: &Outbound, connection_id: &ConnectionId) -> Option<Message> {
    match frame {
        Outbound::Message(message) => match serde_json::to_string(message.as_ref()) {
            Ok(json) => Some(Message::Text(json.into())),
            Err(err) => {
                tracing::error!(
                    %connection_id,
                    kind = message.kind(),
                    error = %err,
                    "Failed to serialize server message"
                );
                None
            }
        },
        Outbound::Probe => Some(Message::Ping(Bytes::new())),
        Outbound::Close => Some(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: Utf8Bytes::from_static("liveness probe not answered"),
        }))),
    }
}

pub(super) async fn write_outbound(
    sender: &mut SocketSink,
    frame: Outbound,
    connection_id: &ConnectionId,
) -> WriteState {
    let closing = matches!(frame, Outbound::Close);
    let Some(message) = encode_outbound(&frame, connection_id) else {
        return WriteState::Open;
    };

    if let Err(err) = sender.send(message).await {
        tracing::debug!(%connection_id, error = %err, "Failed to write frame, connection closed");
        return WriteState::Finished;
    }

    if closing {
        WriteState::Finished
    } else {
        WriteState::Open
    }
}
