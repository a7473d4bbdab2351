use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;

use crate::metrics::ServerMetrics;
use crate::protocol::{ConnectionId, ErrorCode, ListingStatus, RoomId, RoomListing};

use super::room::{GraceMark, Room};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RoomError {
    #[error("Room {0} already has a robot")]
    RoomOccupiedByProducer(RoomId),
    #[error("Room {0} already has a viewer")]
    RoomOccupiedByViewer(RoomId),
    #[error("No robot in room {0}")]
    NoProducerInRoom(RoomId),
    #[error("Already in room {0}")]
    AlreadyInRoom(RoomId),
    #[error("Client must register before joining a room")]
    NotRegistered,
}

impl RoomError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::RoomOccupiedByProducer(_) => ErrorCode::RoomOccupiedByProducer,
            Self::RoomOccupiedByViewer(_) => ErrorCode::RoomOccupiedByViewer,
            Self::NoProducerInRoom(_) => ErrorCode::NoProducerInRoom,
            Self::AlreadyInRoom(_) => ErrorCode::AlreadyInRoom,
            Self::NotRegistered => ErrorCode::NotRegistered,
        }
    }
}

/// A scheduled grace-expiry check, carrying the mark it must validate against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraceCheck {
    pub room_id: RoomId,
    pub mark: GraceMark,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomCounts {
    pub total: usize,
    pub paired: usize,
    pub available: usize,
    pub reconnecting: usize,
}

/// Owner of every room and of the connection-to-room index.
pub struct RoomBroker {
    pub(super) rooms: HashMap<RoomId, Room>,
    pub(super) memberships: HashMap<ConnectionId, RoomId>,
    next_grace_seq: u64,
    pub(super) metrics: Arc<ServerMetrics>,
}

impl RoomBroker {
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self {
            rooms: HashMap::new(),
            memberships: HashMap::new(),
            next_grace_seq: 0,
            metrics,
        }
    }

    /// The only way a room comes into existence.
    pub(super) fn get_or_create(&mut self, room_id: &str) -> &mut Room {
        if !self.rooms.contains_key(room_id) {
            tracing::info!(room_id, "Room created");
            self.metrics.increment_rooms_created();
        }
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id.to_string()))
    }

    pub(super) fn next_grace_mark(&mut self) -> GraceMark {
        self.next_grace_seq += 1;
        GraceMark {
            disconnected_at: Instant::now(),
            seq: self.next_grace_seq,
        }
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    pub fn room_of(&self, connection_id: &ConnectionId) -> Option<&Room> {
        self.memberships
            .get(connection_id)
            .and_then(|room_id| self.rooms.get(room_id))
    }

    /// The other occupant of the room `connection_id` sits in.
    pub fn peer_of(&self, connection_id: &ConnectionId) -> Option<ConnectionId> {
        self.room_of(connection_id)?.peer_of(connection_id)
    }

    /// Joinable rooms, sorted by id.
    pub fn listing(&self) -> Vec<RoomListing> {
        let mut listing: Vec<RoomListing> = self.rooms.values().filter_map(Room::listing).collect();
        listing.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        listing
    }

    pub fn counts(&self) -> RoomCounts {
        self.rooms
            .values()
            .fold(RoomCounts::default(), |mut counts, room| {
                counts.total += 1;
                if room.is_paired() {
                    counts.paired += 1;
                }
                match room.listing().map(|listing| listing.status) {
                    Some(ListingStatus::Available) => counts.available += 1,
                    Some(ListingStatus::Reconnecting) => counts.reconnecting += 1,
                    None => {}
                }
                counts
            })
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
