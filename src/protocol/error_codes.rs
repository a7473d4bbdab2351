use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes carried on `error` frames so clients can react programmatically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Protocol errors
    InvalidMessage,
    UnknownMessageType,
    MessageTooLarge,
    NotRegistered,

    // Registration errors
    AlreadyRegistered,
    InvalidRole,

    // Room errors
    InvalidRoomId,
    AlreadyInRoom,
    RoomOccupiedByProducer,
    RoomOccupiedByViewer,
    NoProducerInRoom,

    // Server errors
    InternalError,
}

impl ErrorCode {
    /// Returns a human-readable description of this error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::InvalidMessage => {
                "The frame could not be decoded. Frames must be JSON objects with a `type` field."
            }
            Self::UnknownMessageType => {
                "The message type is not recognized by this server."
            }
            Self::MessageTooLarge => {
                "The message size exceeds the maximum allowed limit. Please send a smaller message."
            }
            Self::NotRegistered => {
                "This operation requires registration. Send a `register` message first."
            }
            Self::AlreadyRegistered => {
                "This connection has already registered a role. Roles cannot be changed."
            }
            Self::InvalidRole => {
                "The client type is not recognized. Use `producer` (or `robot`) or `viewer`."
            }
            Self::InvalidRoomId => {
                "The room id is invalid. Room ids must be non-empty and free of control characters."
            }
            Self::AlreadyInRoom => {
                "This connection is already bound to a different room. Reconnect to switch rooms."
            }
            Self::RoomOccupiedByProducer => {
                "Another robot is already streaming in this room. Choose a different room id."
            }
            Self::RoomOccupiedByViewer => {
                "Another viewer is already watching this room. Try again once it is free."
            }
            Self::NoProducerInRoom => {
                "No robot is present in this room. Pick a room from the available listing."
            }
            Self::InternalError => {
                "An unexpected server error occurred while handling the message."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}
