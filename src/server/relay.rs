use crate::metrics::ServerMetrics;
use crate::protocol::{ConnectionId, ServerMessage, SignalKind, SignalPayload};

use super::connection_registry::{ConnectionRegistry, DeliveryOutcome};
use super::room_broker::RoomBroker;
use super::SignalingBroker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    Delivered { to: ConnectionId },
    /// The sender is not in any room
    NoRoom,
    /// The opposite slot is empty
    NoPeer,
    /// The peer exists but its queue did not take the frame
    Undeliverable { to: ConnectionId },
}

/// Forward a negotiation payload to the sender's room peer, stamped with `from`.
///
/// Every failure is silent toward the sender; a peer may legitimately be
/// mid-disconnect when a stray candidate arrives.
pub fn relay(
    registry: &mut ConnectionRegistry,
    rooms: &RoomBroker,
    metrics: &ServerMetrics,
    sender: ConnectionId,
    kind: SignalKind,
    payload: SignalPayload,
) -> RelayOutcome {
    let Some(room) = rooms.room_of(&sender) else {
        tracing::debug!(%sender, kind = kind.as_str(), "Relay dropped: sender not in a room");
        metrics.increment_relays_dropped();
        return RelayOutcome::NoRoom;
    };
    let Some(peer) = room.peer_of(&sender) else {
        tracing::debug!(
            %sender,
            room_id = %room.id,
            kind = kind.as_str(),
            "Relay dropped: no peer in room"
        );
        metrics.increment_relays_dropped();
        return RelayOutcome::NoPeer;
    };

    match registry.deliver(&peer, ServerMessage::relayed(kind, sender, payload)) {
        DeliveryOutcome::Delivered => {
            metrics.increment_messages_relayed();
            tracing::trace!(%sender, %peer, kind = kind.as_str(), "Relayed signaling message");
            RelayOutcome::Delivered { to: peer }
        }
        DeliveryOutcome::Dropped(_) | DeliveryOutcome::NotFound => {
            metrics.increment_relays_dropped();
            RelayOutcome::Undeliverable { to: peer }
        }
    }
}

impl SignalingBroker {
    pub(super) fn handle_signal(
        &mut self,
        connection_id: ConnectionId,
        kind: SignalKind,
        payload: SignalPayload,
    ) {
        if self.require_registered(connection_id).is_none() {
            return;
        }
        relay(
            &mut self.registry,
            &self.rooms,
            &self.metrics,
            connection_id,
            kind,
            payload,
        );
    }
}
