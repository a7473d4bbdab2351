use crate::server::BrokerHandle;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::response::Response;
use std::net::SocketAddr;

use super::connection::handle_socket;

/// Frames up to this multiple of the configured limit are read and answered with
/// `MESSAGE_TOO_LARGE`; anything bigger fails the socket at the transport.
const TRANSPORT_LIMIT_FACTOR: usize = 4;

/// WebSocket handler for the signaling protocol
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(broker): State<BrokerHandle>,
) -> Response {
    let transport_limit = broker
        .config()
        .max_message_size
        .saturating_mul(TRANSPORT_LIMIT_FACTOR);

    ws.max_message_size(transport_limit)
        .on_upgrade(move |socket| handle_socket(socket, broker, addr))
}
