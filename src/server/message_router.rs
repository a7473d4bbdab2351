use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;
use thiserror::Error;

use crate::protocol::validation::{normalize_robot_label, validate_room_id_with_config};
use crate::protocol::{
    ClientMessage, ClientRole, ConnectionId, ErrorCode, RoomId, ServerMessage, SignalKind,
    INBOUND_MESSAGE_TYPES,
};

use super::SignalingBroker;

/// Why an inbound frame could not be turned into a [`ClientMessage`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(String),
    #[error("Message must be a JSON object")]
    NotAnObject,
    #[error("Message is missing a string 'type' field")]
    MissingType,
    #[error("Unknown message type: {0}")]
    UnknownType(String),
    #[error("Invalid '{kind}' message: {reason}")]
    InvalidFields { kind: String, reason: String },
}

impl FrameError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownType(_) => ErrorCode::UnknownMessageType,
            Self::InvalidJson(_)
            | Self::NotAnObject
            | Self::MissingType
            | Self::InvalidFields { .. } => ErrorCode::InvalidMessage,
        }
    }
}

/// Decode one text frame, telling unknown types apart from malformed ones.
pub fn decode_frame(text: &str) -> Result<ClientMessage, FrameError> {
    let value: Value =
        serde_json::from_str(text).map_err(|err| FrameError::InvalidJson(err.to_string()))?;
    let object = value.as_object().ok_or(FrameError::NotAnObject)?;
    let kind = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?
        .to_string();

    if !INBOUND_MESSAGE_TYPES.contains(&kind.as_str()) {
        return Err(FrameError::UnknownType(kind));
    }

    serde_json::from_value(value).map_err(|err| FrameError::InvalidFields {
        kind,
        reason: err.to_string(),
    })
}

impl SignalingBroker {
    /// Entry point for every inbound text frame.
    ///
    /// A fault while handling one frame is contained to that frame.
    pub(super) fn handle_frame(&mut self, connection_id: ConnectionId, text: &str) {
        self.metrics.increment_frames_received();

        let outcome = catch_unwind(AssertUnwindSafe(|| self.dispatch_frame(connection_id, text)));
        if let Err(panic) = outcome {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(%connection_id, %detail, "Frame handler fault");
            self.metrics.increment_handler_faults();
            self.reply_error(connection_id, ErrorCode::InternalError, "Internal server error");
        }
    }

    fn dispatch_frame(&mut self, connection_id: ConnectionId, text: &str) {
        match decode_frame(text) {
            Ok(message) => self.handle_client_message(connection_id, message),
            Err(err) => {
                tracing::debug!(%connection_id, error = %err, "Rejected client frame");
                self.reply_error(connection_id, err.code(), err.to_string());
            }
        }
    }

    /// Route a decoded message to exactly one registry, room or relay operation.
    pub(super) fn handle_client_message(
        &mut self,
        connection_id: ConnectionId,
        message: ClientMessage,
    ) {
        match message {
            ClientMessage::Register {
                client_type,
                robot_id,
            } => self.handle_register(connection_id, &client_type, robot_id),
            ClientMessage::JoinRoom { room_id } => self.handle_join_room(connection_id, room_id),
            ClientMessage::Offer { payload } => {
                self.handle_signal(connection_id, SignalKind::Offer, payload);
            }
            ClientMessage::Answer { payload } => {
                self.handle_signal(connection_id, SignalKind::Answer, payload);
            }
            ClientMessage::IceCandidate { payload } => {
                self.handle_signal(connection_id, SignalKind::IceCandidate, payload);
            }
            ClientMessage::GetRooms => self.handle_get_rooms(connection_id),
            ClientMessage::Ping { timestamp } | ClientMessage::Heartbeat { timestamp } => {
                self.handle_keepalive(connection_id, timestamp);
            }
        }
    }

    fn handle_register(
        &mut self,
        connection_id: ConnectionId,
        client_type: &str,
        robot_id: Option<String>,
    ) {
        let label = normalize_robot_label(robot_id, &self.config.protocol);
        match self.registry.register(&connection_id, client_type, label) {
            Ok(role) => self.reply(
                connection_id,
                ServerMessage::Registered {
                    client_id: connection_id,
                    client_type: role,
                },
            ),
            Err(err) => {
                tracing::debug!(%connection_id, error = %err, "Registration rejected");
                self.reply_error(connection_id, err.code(), err.to_string());
            }
        }
    }

    fn handle_join_room(&mut self, connection_id: ConnectionId, room_id: RoomId) {
        if self.require_registered(connection_id).is_none() {
            return;
        }

        if let Err(reason) = validate_room_id_with_config(&room_id, &self.config.protocol) {
            self.reply_error(connection_id, ErrorCode::InvalidRoomId, reason);
            return;
        }

        if let Err(err) = self.rooms.join(&mut self.registry, connection_id, room_id) {
            tracing::info!(%connection_id, error = %err, "Join rejected");
            self.reply_error(connection_id, err.code(), err.to_string());
        }
    }

    fn handle_get_rooms(&mut self, connection_id: ConnectionId) {
        let rooms = self.rooms.listing();
        self.reply(
            connection_id,
            ServerMessage::AvailableRooms {
                rooms,
                timestamp: chrono::Utc::now().timestamp_millis(),
            },
        );
    }

    /// The caller's role, or `None` after replying `NOT_REGISTERED`.
    pub(super) fn require_registered(&mut self, connection_id: ConnectionId) -> Option<ClientRole> {
        let role = self.registry.role_of(&connection_id);
        if role.is_none() {
            self.reply_error(
                connection_id,
                ErrorCode::NotRegistered,
                "Client must register first",
            );
        }
        role
    }

    pub(super) fn reply_error(
        &mut self,
        connection_id: ConnectionId,
        code: ErrorCode,
        message: impl Into<String>,
    ) {
        self.metrics.increment_protocol_errors();
        self.reply(connection_id, ServerMessage::error(code, message));
    }
}
