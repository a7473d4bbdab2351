use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Duration;
use uuid::Uuid;

use crate::config::ProtocolConfig;
use crate::metrics::ServerMetrics;
use crate::protocol::{ClientRole, ConnectionId, ServerMessage};

use super::{BrokerConfig, BrokerEvent, BrokerHandle, GraceCheck, Outbound, SignalingBroker};

pub(crate) fn test_config() -> BrokerConfig {
    BrokerConfig {
        liveness_interval: Duration::from_secs(30),
        reconnect_grace: Duration::from_secs(10),
        event_queue_capacity: 64,
        outbound_queue_capacity: 64,
        max_message_size: 65536,
        protocol: ProtocolConfig::default(),
    }
}

/// The receiving end of one fake connection.
pub(crate) struct TestClient {
    pub id: ConnectionId,
    rx: mpsc::Receiver<Outbound>,
    pending: Vec<Arc<ServerMessage>>,
}

impl TestClient {
    fn new(rx: mpsc::Receiver<Outbound>) -> Self {
        Self {
            id: Uuid::new_v4(),
            rx,
            pending: Vec::new(),
        }
    }

    /// Protocol messages received so far, skipping probes and close requests.
    pub fn drain_messages(&mut self) -> Vec<Arc<ServerMessage>> {
        let mut messages = std::mem::take(&mut self.pending);
        while let Ok(frame) = self.rx.try_recv() {
            if let Outbound::Message(message) = frame {
                messages.push(message);
            }
        }
        messages
    }

    /// Wait for the next liveness probe, keeping any messages seen on the way.
    pub async fn wait_for_probe(&mut self) {
        while let Some(frame) = self.rx.recv().await {
            match frame {
                Outbound::Probe => return,
                Outbound::Message(message) => self.pending.push(message),
                Outbound::Close => panic!("connection {} was closed", self.id),
            }
        }
        panic!("outbound queue for {} closed", self.id);
    }

    pub async fn send(&self, handle: &BrokerHandle, frame: Value) {
        handle.frame(self.id, frame.to_string()).await.unwrap();
    }
}

/// Connect and register a client on a spawned broker.
pub(crate) async fn spawn_client(handle: &BrokerHandle, role: ClientRole) -> TestClient {
    let (tx, rx) = mpsc::channel(64);
    let mut client = TestClient::new(rx);
    handle
        .connect(client.id, tx, "127.0.0.1:41000".parse().unwrap())
        .await
        .unwrap();
    client
        .send(
            handle,
            serde_json::json!({"type": "register", "clientType": role.as_str()}),
        )
        .await;
    settle(handle).await;

    let registered = client.drain_messages();
    assert!(
        matches!(registered.first().map(|m| &**m), Some(ServerMessage::Registered { .. })),
        "expected registration ack, got {registered:?}"
    );
    client
}

/// Wait until the broker has processed every event queued before this call.
pub(crate) async fn settle(handle: &BrokerHandle) {
    handle.snapshot().await.unwrap();
}

/// Drives a broker synchronously, without a task or timers.
pub(crate) struct TestHarness {
    pub broker: SignalingBroker,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            broker: SignalingBroker::new(test_config(), Arc::new(ServerMetrics::new())),
        }
    }

    pub fn connect(&mut self) -> TestClient {
        let (tx, rx) = mpsc::channel(64);
        let client = TestClient::new(rx);
        self.broker.handle_event(BrokerEvent::Connected {
            connection_id: client.id,
            sender: tx,
            client_addr: "127.0.0.1:42000".parse().unwrap(),
        });
        client
    }

    pub fn registered(&mut self, role: ClientRole) -> TestClient {
        let mut client = self.connect();
        self.frame(
            &client,
            serde_json::json!({"type": "register", "clientType": role.as_str()}),
        );
        client.drain_messages();
        client
    }

    pub fn frame(&mut self, client: &TestClient, frame: Value) {
        self.raw_frame(client, &frame.to_string());
    }

    pub fn raw_frame(&mut self, client: &TestClient, text: &str) {
        self.broker.handle_event(BrokerEvent::Frame {
            connection_id: client.id,
            text: text.to_string(),
        });
        self.broker.reap_closed_peers();
    }

    pub fn disconnect(&mut self, client: &TestClient) {
        self.broker.handle_event(BrokerEvent::Disconnected {
            connection_id: client.id,
        });
    }

    /// The check that was scheduled when `room_id` entered grace.
    pub fn grace_check(&self, room_id: &str) -> GraceCheck {
        let mark = self
            .broker
            .rooms
            .room(room_id)
            .and_then(|room| room.producer_disconnected_at)
            .expect("room is in grace");
        GraceCheck {
            room_id: room_id.to_string(),
            mark,
        }
    }

    /// Fire a grace check as if its timer elapsed.
    pub fn expire(&mut self, check: GraceCheck) {
        self.broker.on_grace_expired(check);
        self.broker.reap_closed_peers();
    }
}
