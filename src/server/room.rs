use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::protocol::{ClientRole, ConnectionId, ListingStatus, RoomId, RoomListing, RoomStatus};

/// Identity of one producer-disconnect event.
///
/// Instants alone can collide under a paused clock, so each mark also carries a
/// broker-wide sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraceMark {
    pub disconnected_at: Instant,
    pub seq: u64,
}

/// A pairing slot for one producer and one viewer.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub producer: Option<ConnectionId>,
    /// Label of the current producer, or of the last one while in grace
    pub producer_label: Option<String>,
    pub viewer: Option<ConnectionId>,
    /// Present only while the reconnect grace window is open
    pub producer_disconnected_at: Option<GraceMark>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            producer: None,
            producer_label: None,
            viewer: None,
            producer_disconnected_at: None,
            created_at: Utc::now(),
        }
    }

    /// Time since the room was first claimed.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    pub fn in_grace(&self) -> bool {
        self.producer_disconnected_at.is_some()
    }

    pub fn is_paired(&self) -> bool {
        self.producer.is_some() && self.viewer.is_some()
    }

    /// No occupants and nothing pending; such a room must not be kept.
    pub fn is_empty(&self) -> bool {
        self.producer.is_none() && self.viewer.is_none() && !self.in_grace()
    }

    pub fn status(&self) -> RoomStatus {
        match (self.producer, self.viewer) {
            (Some(_), Some(_)) => RoomStatus::Paired,
            (Some(_), None) => RoomStatus::WaitingForViewer,
            (None, _) => RoomStatus::WaitingForProducer,
        }
    }

    /// Which slot `id` occupies, if any.
    pub fn slot_of(&self, id: &ConnectionId) -> Option<ClientRole> {
        if self.producer.as_ref() == Some(id) {
            Some(ClientRole::Producer)
        } else if self.viewer.as_ref() == Some(id) {
            Some(ClientRole::Viewer)
        } else {
            None
        }
    }

    /// The occupant of the opposite slot.
    pub fn peer_of(&self, id: &ConnectionId) -> Option<ConnectionId> {
        match self.slot_of(id)? {
            ClientRole::Producer => self.viewer,
            ClientRole::Viewer => self.producer,
        }
    }

    /// How the room shows up in `available_rooms`; `None` when it is not joinable.
    pub fn listing(&self) -> Option<RoomListing> {
        if self.viewer.is_some() {
            return None;
        }

        let status = match (self.producer, self.in_grace()) {
            (Some(_), false) => ListingStatus::Available,
            (None, true) => ListingStatus::Reconnecting,
            _ => return None,
        };

        Some(RoomListing {
            room_id: self.id.clone(),
            status,
            robot_id: self.producer_label.clone(),
        })
    }
}
