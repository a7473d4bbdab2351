use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Default upper bound for room identifiers when no config is available.
pub const DEFAULT_MAX_ROOM_ID_LENGTH: usize = 128;

/// Unique identifier assigned to every accepted connection
pub type ConnectionId = Uuid;
/// Room identifiers are chosen by clients
pub type RoomId = String;

/// Role a connection declares at registration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ClientRole {
    /// Media-originating peer (the robot side)
    Producer,
    /// Media-consuming peer (the browser / monitoring side)
    Viewer,
}

impl ClientRole {
    /// Parse a `clientType` value, accepting the aliases deployed clients send.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "producer" | "robot" => Some(Self::Producer),
            "viewer" | "web" | "browser" => Some(Self::Viewer),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Viewer => "viewer",
        }
    }
}

impl fmt::Display for ClientRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pairing status reported to a client after joining.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    WaitingForViewer,
    WaitingForProducer,
    Paired,
}

/// Status of a room in the `available_rooms` listing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ListingStatus {
    Available,
    Reconnecting,
}

/// One entry of the room listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomListing {
    pub room_id: RoomId,
    pub status: ListingStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub robot_id: Option<String>,
}

/// The negotiation message kinds relayed verbatim between paired peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::IceCandidate => "ice_candidate",
        }
    }
}

/// Opaque negotiation payload: every field of the inbound frame except `type`.
pub type SignalPayload = serde_json::Map<String, serde_json::Value>;
