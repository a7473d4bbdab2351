use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use crate::protocol::{ClientRole, ErrorCode, ListingStatus, RoomStatus, ServerMessage};

use super::test_support::{TestClient, TestHarness};
use super::SignalingBroker;

fn join(harness: &mut TestHarness, client: &TestClient, room_id: &str) {
    harness.frame(client, json!({"type": "join_room", "roomId": room_id}));
}

fn kinds(messages: &[Arc<ServerMessage>]) -> Vec<&'static str> {
    messages.iter().map(|message| message.kind()).collect()
}

fn error_code(messages: &[Arc<ServerMessage>]) -> Option<ErrorCode> {
    messages.iter().find_map(|message| match message.as_ref() {
        ServerMessage::Error { code, .. } => *code,
        _ => None,
    })
}

/// Cross-checks rooms, memberships and registry roles.
fn assert_consistent(broker: &SignalingBroker) {
    let rooms = &broker.rooms;
    for (room_id, room) in &rooms.rooms {
        assert!(!room.is_empty(), "empty room {room_id} was kept");
        if room.in_grace() {
            assert!(room.producer.is_none(), "grace mark on occupied room {room_id}");
        }
        for (slot, role) in [
            (room.producer, ClientRole::Producer),
            (room.viewer, ClientRole::Viewer),
        ] {
            if let Some(id) = slot {
                assert_eq!(broker.registry.role_of(&id), Some(role));
                assert_eq!(rooms.memberships.get(&id), Some(room_id));
            }
        }
    }
    for (connection_id, room_id) in &rooms.memberships {
        let room = rooms.rooms.get(room_id).expect("membership points at a live room");
        assert!(room.slot_of(connection_id).is_some());
    }
}

#[test]
fn producer_join_creates_room_waiting_for_viewer() {
    let mut harness = TestHarness::new();
    let mut producer = harness.registered(ClientRole::Producer);

    join(&mut harness, &producer, "r1");

    let messages = producer.drain_messages();
    assert_eq!(
        messages[0].as_ref(),
        &ServerMessage::RoomJoined {
            room_id: "r1".to_string(),
            role: ClientRole::Producer,
            room_status: RoomStatus::WaitingForViewer,
        }
    );
    let listing = harness.broker.rooms.listing();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].status, ListingStatus::Available);
    assert_eq!(harness.broker.metrics.snapshot().rooms.rooms_created, 1);
}

#[test]
fn viewer_cannot_create_room() {
    let mut harness = TestHarness::new();
    let mut viewer = harness.registered(ClientRole::Viewer);

    join(&mut harness, &viewer, "nowhere");

    assert_eq!(error_code(&viewer.drain_messages()), Some(ErrorCode::NoProducerInRoom));
    assert!(harness.broker.rooms.is_empty());
    assert!(harness.broker.rooms.listing().is_empty());
}

#[test]
fn pairing_notifies_both_sides_once() {
    let mut harness = TestHarness::new();
    let mut producer = harness.registered(ClientRole::Producer);
    let mut viewer = harness.registered(ClientRole::Viewer);

    join(&mut harness, &producer, "r1");
    producer.drain_messages();
    join(&mut harness, &viewer, "r1");

    let to_viewer = viewer.drain_messages();
    assert_eq!(kinds(&to_viewer), vec!["room_joined", "peer_joined"]);
    match to_viewer[1].as_ref() {
        ServerMessage::PeerJoined {
            peer_id,
            peer_type,
            robot_id,
        } => {
            assert_eq!(*peer_id, producer.id);
            assert_eq!(*peer_type, ClientRole::Producer);
            assert_eq!(robot_id.as_deref(), Some(producer.id.to_string().as_str()));
        }
        other => panic!("unexpected message: {other:?}"),
    }

    let to_producer = producer.drain_messages();
    assert_eq!(
        to_producer
            .iter()
            .map(|message| message.as_ref())
            .collect::<Vec<_>>(),
        vec![&ServerMessage::PeerJoined {
            peer_id: viewer.id,
            peer_type: ClientRole::Viewer,
            robot_id: None,
        }]
    );
    assert!(harness.broker.rooms.listing().is_empty(), "paired rooms are not listed");
    assert_eq!(harness.broker.metrics.snapshot().rooms.pairings, 1);
}

#[test]
fn second_producer_is_rejected_without_state_change() {
    let mut harness = TestHarness::new();
    let first = harness.registered(ClientRole::Producer);
    let mut second = harness.registered(ClientRole::Producer);

    join(&mut harness, &first, "r1");
    join(&mut harness, &second, "r1");

    assert_eq!(
        error_code(&second.drain_messages()),
        Some(ErrorCode::RoomOccupiedByProducer)
    );
    let room = harness.broker.rooms.room("r1").unwrap();
    assert_eq!(room.producer, Some(first.id));
    assert!(harness.broker.rooms.room_of(&second.id).is_none());

    // The rejected producer is still free to take another room.
    join(&mut harness, &second, "r2");
    assert_eq!(kinds(&second.drain_messages()), vec!["room_joined"]);
    assert_consistent(&harness.broker);
}

#[test]
fn second_viewer_is_rejected() {
    let mut harness = TestHarness::new();
    let producer = harness.registered(ClientRole::Producer);
    let viewer = harness.registered(ClientRole::Viewer);
    let mut intruder = harness.registered(ClientRole::Viewer);

    join(&mut harness, &producer, "r1");
    join(&mut harness, &viewer, "r1");
    join(&mut harness, &intruder, "r1");

    assert_eq!(
        error_code(&intruder.drain_messages()),
        Some(ErrorCode::RoomOccupiedByViewer)
    );
    assert_eq!(harness.broker.rooms.room("r1").unwrap().viewer, Some(viewer.id));
}

#[test]
fn switching_rooms_is_rejected_but_rejoin_is_idempotent() {
    let mut harness = TestHarness::new();
    let mut producer = harness.registered(ClientRole::Producer);
    let viewer = harness.registered(ClientRole::Viewer);
    join(&mut harness, &producer, "r1");
    join(&mut harness, &viewer, "r1");
    producer.drain_messages();

    join(&mut harness, &producer, "r2");
    assert_eq!(error_code(&producer.drain_messages()), Some(ErrorCode::AlreadyInRoom));
    assert!(harness.broker.rooms.room("r2").is_none());

    join(&mut harness, &producer, "r1");
    let messages = producer.drain_messages();
    assert_eq!(
        messages.iter().map(|m| m.as_ref()).collect::<Vec<_>>(),
        vec![&ServerMessage::RoomJoined {
            room_id: "r1".to_string(),
            role: ClientRole::Producer,
            room_status: RoomStatus::Paired,
        }]
    );
    assert_eq!(harness.broker.metrics.snapshot().rooms.pairings, 1);
}

#[test]
fn viewer_departure_keeps_room_for_next_viewer() {
    let mut harness = TestHarness::new();
    let mut producer = harness.registered(ClientRole::Producer);
    let first_viewer = harness.registered(ClientRole::Viewer);
    join(&mut harness, &producer, "r1");
    join(&mut harness, &first_viewer, "r1");
    producer.drain_messages();

    harness.disconnect(&first_viewer);

    assert_eq!(
        producer
            .drain_messages()
            .iter()
            .map(|m| m.as_ref().clone())
            .collect::<Vec<_>>(),
        vec![ServerMessage::PeerDisconnected {
            peer_id: first_viewer.id,
            peer_type: ClientRole::Viewer,
        }]
    );
    let listing = harness.broker.rooms.listing();
    assert_eq!(listing[0].room_id, "r1");
    assert_eq!(listing[0].status, ListingStatus::Available);

    let mut next_viewer = harness.registered(ClientRole::Viewer);
    join(&mut harness, &next_viewer, "r1");
    assert_eq!(kinds(&next_viewer.drain_messages()), vec!["room_joined", "peer_joined"]);
    assert_eq!(kinds(&producer.drain_messages()), vec!["peer_joined"]);
    assert_consistent(&harness.broker);
}

#[tokio::test(start_paused = true)]
async fn producer_departure_starts_grace_and_notifies_viewer() {
    let mut harness = TestHarness::new();
    let producer = harness.registered(ClientRole::Producer);
    let mut viewer = harness.registered(ClientRole::Viewer);
    join(&mut harness, &producer, "r1");
    join(&mut harness, &viewer, "r1");
    viewer.drain_messages();

    harness.disconnect(&producer);

    let messages = viewer.drain_messages();
    assert_eq!(kinds(&messages), vec!["robot_disconnected"]);
    let room = harness.broker.rooms.room("r1").unwrap();
    assert!(room.in_grace());
    assert_eq!(room.viewer, Some(viewer.id));
    assert!(
        harness.broker.rooms.listing().is_empty(),
        "a room with a parked viewer is not listed"
    );
    assert_eq!(harness.broker.grace_timers.len(), 1);
    assert_consistent(&harness.broker);
}

#[tokio::test(start_paused = true)]
async fn reconnect_within_grace_restarts_negotiation() {
    let mut harness = TestHarness::new();
    let producer = harness.registered(ClientRole::Producer);
    let mut viewer = harness.registered(ClientRole::Viewer);
    join(&mut harness, &producer, "r1");
    join(&mut harness, &viewer, "r1");
    harness.disconnect(&producer);
    let stale = harness.grace_check("r1");
    viewer.drain_messages();

    let mut returning = harness.registered(ClientRole::Producer);
    join(&mut harness, &returning, "r1");

    assert_eq!(kinds(&viewer.drain_messages()), vec!["robot_reconnected", "peer_joined"]);
    assert_eq!(kinds(&returning.drain_messages()), vec!["room_joined", "peer_joined"]);

    harness.expire(stale);
    let room = harness.broker.rooms.room("r1").expect("room survives stale check");
    assert!(room.is_paired());
    assert!(!room.in_grace());
    assert!(viewer.drain_messages().is_empty(), "no room_closed after reconnect");
    assert_eq!(harness.broker.metrics.snapshot().rooms.producer_reconnections, 1);
}

#[tokio::test(start_paused = true)]
async fn grace_expiry_closes_room_exactly_once() {
    let mut harness = TestHarness::new();
    let producer = harness.registered(ClientRole::Producer);
    let mut viewer = harness.registered(ClientRole::Viewer);
    join(&mut harness, &producer, "r1");
    join(&mut harness, &viewer, "r1");
    harness.disconnect(&producer);
    let check = harness.grace_check("r1");
    viewer.drain_messages();

    harness.expire(check.clone());
    harness.expire(check);

    let messages = viewer.drain_messages();
    assert_eq!(kinds(&messages), vec!["room_closed"]);
    assert!(harness.broker.rooms.room("r1").is_none());
    assert!(harness.broker.rooms.room_of(&viewer.id).is_none());
    assert!(harness.broker.rooms.listing().is_empty());

    // The viewer is free again and can be told there is nothing to join.
    join(&mut harness, &viewer, "r1");
    assert_eq!(error_code(&viewer.drain_messages()), Some(ErrorCode::NoProducerInRoom));
    assert_eq!(harness.broker.metrics.snapshot().rooms.rooms_closed, 1);
}

#[tokio::test(start_paused = true)]
async fn viewer_may_park_in_grace_room() {
    let mut harness = TestHarness::new();
    let producer = harness.registered(ClientRole::Producer);
    join(&mut harness, &producer, "r2");
    harness.disconnect(&producer);

    let listing = harness.broker.rooms.listing();
    assert_eq!(listing[0].status, ListingStatus::Reconnecting);
    assert_eq!(listing[0].robot_id.as_deref(), Some(producer.id.to_string().as_str()));

    let mut viewer = harness.registered(ClientRole::Viewer);
    join(&mut harness, &viewer, "r2");

    let messages = viewer.drain_messages();
    assert_eq!(
        messages[0].as_ref(),
        &ServerMessage::RoomJoined {
            room_id: "r2".to_string(),
            role: ClientRole::Viewer,
            room_status: RoomStatus::WaitingForProducer,
        }
    );
    assert!(matches!(
        messages[1].as_ref(),
        ServerMessage::RoomStatusUpdate {
            status: RoomStatus::WaitingForProducer,
            ..
        }
    ));
    assert_consistent(&harness.broker);
}

#[tokio::test(start_paused = true)]
async fn only_the_latest_disconnect_can_close_the_room() {
    let mut harness = TestHarness::new();
    let first = harness.registered(ClientRole::Producer);
    join(&mut harness, &first, "r1");
    harness.disconnect(&first);
    let first_check = harness.grace_check("r1");

    let second = harness.registered(ClientRole::Producer);
    join(&mut harness, &second, "r1");
    harness.disconnect(&second);
    let second_check = harness.grace_check("r1");
    assert_ne!(first_check.mark, second_check.mark);

    harness.expire(first_check);
    assert!(harness.broker.rooms.room("r1").is_some());

    harness.expire(second_check);
    assert!(harness.broker.rooms.room("r1").is_none());
}

#[derive(Debug, Clone)]
enum Op {
    Join { client: usize, room: usize },
    Disconnect { client: usize },
    Expire { room: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0..6usize, 0..3usize).prop_map(|(client, room)| Op::Join { client, room }),
        2 => (0..6usize).prop_map(|client| Op::Disconnect { client }),
        1 => (0..3usize).prop_map(|room| Op::Expire { room }),
    ]
}

proptest! {
    #[test]
    fn prop_rooms_never_hold_two_of_a_role(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = runtime.enter();

        let mut harness = TestHarness::new();
        let role_for = |slot: usize| if slot % 2 == 0 { ClientRole::Producer } else { ClientRole::Viewer };
        let mut clients: Vec<TestClient> = (0..6).map(|slot| harness.registered(role_for(slot))).collect();

        for op in ops {
            match op {
                Op::Join { client, room } => {
                    let room_id = format!("room-{room}");
                    join(&mut harness, &clients[client], &room_id);
                }
                Op::Disconnect { client } => {
                    harness.disconnect(&clients[client]);
                    clients[client] = harness.registered(role_for(client));
                }
                Op::Expire { room } => {
                    let room_id = format!("room-{room}");
                    let mark = harness
                        .broker
                        .rooms
                        .room(&room_id)
                        .and_then(|room| room.producer_disconnected_at);
                    if mark.is_some() {
                        let check = harness.grace_check(&room_id);
                        harness.expire(check);
                    }
                }
            }
            assert_consistent(&harness.broker);
            for client in &mut clients {
                client.drain_messages();
            }
        }
    }
}
