use serde::{Deserialize, Serialize};

use super::error_codes::ErrorCode;
use super::types::{
    ClientRole, ConnectionId, RoomId, RoomListing, RoomStatus, SignalKind, SignalPayload,
};

/// Every `type` value the server accepts from clients.
pub const INBOUND_MESSAGE_TYPES: &[&str] = &[
    "register",
    "join_room",
    "offer",
    "answer",
    "ice_candidate",
    "get_rooms",
    "ping",
    "heartbeat",
];

/// Message types sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Declare this connection's role. Must precede room and relay operations.
    Register {
        /// Raw role string; validated by the registry so unknown roles get a typed error
        client_type: String,
        /// Stable label of the physical robot (producers only)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        robot_id: Option<String>,
    },
    /// Join (or lazily create, for producers) a room
    JoinRoom { room_id: RoomId },
    Offer {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    Answer {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    IceCandidate {
        #[serde(flatten)]
        payload: SignalPayload,
    },
    /// Ask for the rooms a viewer can join
    GetRooms,
    /// Client-initiated keepalive
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<serde_json::Value>,
    },
    /// Keepalive sent by robot clients every 30 seconds; handled like `ping`
    Heartbeat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<serde_json::Value>,
    },
}

/// Message types sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Registration accepted
    Registered {
        client_id: ConnectionId,
        client_type: ClientRole,
    },
    /// Join accepted
    RoomJoined {
        room_id: RoomId,
        role: ClientRole,
        room_status: RoomStatus,
    },
    /// Out-of-band status update for a parked viewer
    #[serde(rename = "room_status")]
    RoomStatusUpdate { status: RoomStatus, message: String },
    /// The opposite slot of the room became occupied; negotiation may begin
    PeerJoined {
        peer_id: ConnectionId,
        peer_type: ClientRole,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        robot_id: Option<String>,
    },
    /// The viewer left the room
    PeerDisconnected {
        peer_id: ConnectionId,
        peer_type: ClientRole,
    },
    /// The producer dropped; the room is held for reconnection
    RobotDisconnected { room_id: RoomId, message: String },
    /// The producer came back within the grace window
    RobotReconnected {
        room_id: RoomId,
        robot_id: String,
        message: String,
    },
    /// The grace window elapsed without the producer returning
    RoomClosed { room_id: RoomId, message: String },
    AvailableRooms {
        rooms: Vec<RoomListing>,
        timestamp: i64,
    },
    Offer {
        from: ConnectionId,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    Answer {
        from: ConnectionId,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    IceCandidate {
        from: ConnectionId,
        #[serde(flatten)]
        payload: SignalPayload,
    },
    Error {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<ErrorCode>,
    },
    Pong {
        /// Server time in epoch milliseconds
        timestamp: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_timestamp: Option<serde_json::Value>,
    },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code: Some(code),
        }
    }

    /// Wrap a negotiation payload for delivery, stamping the sender.
    ///
    /// A client-supplied `from` is discarded so the peer always sees the
    /// server-assigned connection id.
    pub fn relayed(kind: SignalKind, from: ConnectionId, mut payload: SignalPayload) -> Self {
        payload.remove("from");
        match kind {
            SignalKind::Offer => Self::Offer { from, payload },
            SignalKind::Answer => Self::Answer { from, payload },
            SignalKind::IceCandidate => Self::IceCandidate { from, payload },
        }
    }

    /// Wire `type` of this message, used for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::RoomJoined { .. } => "room_joined",
            Self::RoomStatusUpdate { .. } => "room_status",
            Self::PeerJoined { .. } => "peer_joined",
            Self::PeerDisconnected { .. } => "peer_disconnected",
            Self::RobotDisconnected { .. } => "robot_disconnected",
            Self::RobotReconnected { .. } => "robot_reconnected",
            Self::RoomClosed { .. } => "room_closed",
            Self::AvailableRooms { .. } => "available_rooms",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::Error { .. } => "error",
            Self::Pong { .. } => "pong",
        }
    }
}
