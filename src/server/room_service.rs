use tracing::{debug, info};

use crate::protocol::{ClientRole, ConnectionId, RoomId, RoomStatus, ServerMessage};

use super::connection_registry::{Connection, ConnectionRegistry};
use super::room_broker::{GraceCheck, RoomBroker, RoomError};

impl RoomBroker {
    /// Place a registered connection into `room_id` according to its role.
    ///
    /// On success the joiner has been sent `room_joined` and any pairing or
    /// reconnection notices have gone out. On error no state was touched.
    pub fn join(
        &mut self,
        registry: &mut ConnectionRegistry,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<RoomStatus, RoomError> {
        let connection = registry
            .resolve(&connection_id)
            .map_err(|_| RoomError::NotRegistered)?;
        let role = connection.role.ok_or(RoomError::NotRegistered)?;
        let label = connection.label();

        if let Some(current) = self.memberships.get(&connection_id) {
            if *current != room_id {
                return Err(RoomError::AlreadyInRoom(current.clone()));
            }
            // Same room, same role: acknowledge again without side effects.
            let status = self
                .rooms
                .get(&room_id)
                .map(|room| room.status())
                .ok_or_else(|| RoomError::NoProducerInRoom(room_id.clone()))?;
            registry.deliver(
                &connection_id,
                ServerMessage::RoomJoined {
                    room_id,
                    role,
                    room_status: status,
                },
            );
            return Ok(status);
        }

        match role {
            ClientRole::Producer => self.join_as_producer(registry, connection_id, label, room_id),
            ClientRole::Viewer => self.join_as_viewer(registry, connection_id, room_id),
        }
    }

    fn join_as_producer(
        &mut self,
        registry: &mut ConnectionRegistry,
        producer_id: ConnectionId,
        label: String,
        room_id: RoomId,
    ) -> Result<RoomStatus, RoomError> {
        if self
            .rooms
            .get(&room_id)
            .is_some_and(|room| room.producer.is_some())
        {
            return Err(RoomError::RoomOccupiedByProducer(room_id));
        }

        let room = self.get_or_create(&room_id);
        let reconnected = room.producer_disconnected_at.take().is_some();
        room.producer = Some(producer_id);
        room.producer_label = Some(label.clone());
        let viewer = room.viewer;
        let status = room.status();
        self.memberships.insert(producer_id, room_id.clone());

        info!(%producer_id, %room_id, robot_id = %label, reconnected, "Robot joined room");
        registry.deliver(
            &producer_id,
            ServerMessage::RoomJoined {
                room_id: room_id.clone(),
                role: ClientRole::Producer,
                room_status: status,
            },
        );

        if reconnected {
            self.metrics.increment_producer_reconnections();
            if let Some(viewer_id) = viewer {
                registry.deliver(
                    &viewer_id,
                    ServerMessage::RobotReconnected {
                        room_id: room_id.clone(),
                        robot_id: label.clone(),
                        message: "Robot reconnected; restarting video negotiation".to_string(),
                    },
                );
            }
        }

        if let Some(viewer_id) = viewer {
            self.announce_pairing(registry, producer_id, label, viewer_id);
        }

        Ok(status)
    }

    fn join_as_viewer(
        &mut self,
        registry: &mut ConnectionRegistry,
        viewer_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<RoomStatus, RoomError> {
        let Some(room) = self.rooms.get_mut(&room_id) else {
            return Err(RoomError::NoProducerInRoom(room_id));
        };
        if room.viewer.is_some() {
            return Err(RoomError::RoomOccupiedByViewer(room_id));
        }
        if room.producer.is_none() && !room.in_grace() {
            return Err(RoomError::NoProducerInRoom(room_id));
        }

        room.viewer = Some(viewer_id);
        let status = room.status();
        let producer = room.producer.zip(room.producer_label.clone());
        self.memberships.insert(viewer_id, room_id.clone());

        info!(%viewer_id, %room_id, ?status, "Viewer joined room");
        registry.deliver(
            &viewer_id,
            ServerMessage::RoomJoined {
                room_id,
                role: ClientRole::Viewer,
                room_status: status,
            },
        );

        match producer {
            Some((producer_id, label)) => {
                self.announce_pairing(registry, producer_id, label, viewer_id);
            }
            None => {
                registry.deliver(
                    &viewer_id,
                    ServerMessage::RoomStatusUpdate {
                        status: RoomStatus::WaitingForProducer,
                        message: "Robot is reconnecting; waiting for it to return".to_string(),
                    },
                );
            }
        }

        Ok(status)
    }

    /// Both slots just became occupied: introduce the peers to each other.
    fn announce_pairing(
        &self,
        registry: &mut ConnectionRegistry,
        producer_id: ConnectionId,
        label: String,
        viewer_id: ConnectionId,
    ) {
        registry.deliver(
            &producer_id,
            ServerMessage::PeerJoined {
                peer_id: viewer_id,
                peer_type: ClientRole::Viewer,
                robot_id: None,
            },
        );
        registry.deliver(
            &viewer_id,
            ServerMessage::PeerJoined {
                peer_id: producer_id,
                peer_type: ClientRole::Producer,
                robot_id: Some(label),
            },
        );
        self.metrics.increment_pairings();
    }

    /// React to a connection leaving the registry.
    ///
    /// Returns the grace check to schedule when a producer left its room.
    pub fn handle_departure(
        &mut self,
        registry: &mut ConnectionRegistry,
        connection: &Connection,
    ) -> Option<GraceCheck> {
        let connection_id = connection.id;
        let room_id = self.memberships.remove(&connection_id)?;
        let slot = self.rooms.get(&room_id)?.slot_of(&connection_id)?;

        match slot {
            ClientRole::Producer => {
                let mark = self.next_grace_mark();
                let room = self.rooms.get_mut(&room_id)?;
                room.producer = None;
                room.producer_disconnected_at = Some(mark);
                info!(%connection_id, %room_id, "Robot left room; holding it for reconnection");

                if let Some(viewer_id) = room.viewer {
                    registry.deliver(
                        &viewer_id,
                        ServerMessage::RobotDisconnected {
                            room_id: room_id.clone(),
                            message: "Robot disconnected; waiting for it to reconnect".to_string(),
                        },
                    );
                }
                Some(GraceCheck { room_id, mark })
            }
            ClientRole::Viewer => {
                let room = self.rooms.get_mut(&room_id)?;
                room.viewer = None;
                info!(%connection_id, %room_id, "Viewer left room");

                if let Some(producer_id) = room.producer {
                    registry.deliver(
                        &producer_id,
                        ServerMessage::PeerDisconnected {
                            peer_id: connection_id,
                            peer_type: ClientRole::Viewer,
                        },
                    );
                }
                if room.is_empty() {
                    self.rooms.remove(&room_id);
                }
                None
            }
        }
    }

    /// Close a room whose producer never came back.
    ///
    /// A check whose mark no longer matches the room (the producer returned, or
    /// left again later) is stale and does nothing. Returns whether the room was
    /// closed.
    pub fn expire_grace(&mut self, registry: &mut ConnectionRegistry, check: &GraceCheck) -> bool {
        let still_current = self.rooms.get(&check.room_id).is_some_and(|room| {
            room.producer.is_none() && room.producer_disconnected_at == Some(check.mark)
        });
        if !still_current {
            debug!(room_id = %check.room_id, seq = check.mark.seq, "Stale grace check ignored");
            return false;
        }

        let Some(room) = self.rooms.remove(&check.room_id) else {
            return false;
        };
        self.metrics.increment_rooms_closed();
        info!(
            room_id = %room.id,
            age_secs = room.age().num_seconds(),
            "Reconnect grace elapsed; room closed"
        );

        if let Some(viewer_id) = room.viewer {
            self.memberships.remove(&viewer_id);
            registry.deliver(
                &viewer_id,
                ServerMessage::RoomClosed {
                    room_id: room.id,
                    message: "Robot did not reconnect; room closed".to_string(),
                },
            );
        }
        true
    }
}
