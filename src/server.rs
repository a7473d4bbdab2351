use crate::config::{
    Config, ProtocolConfig, MAX_LIVENESS_INTERVAL_SECS, MAX_RECONNECT_GRACE_SECS,
};
use crate::metrics::ServerMetrics;
use crate::protocol::{ConnectionId, RoomListing, ServerMessage};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::time::DelayQueue;

mod connection_registry;
mod liveness;
mod message_router;
mod relay;
mod room;
mod room_broker;
#[cfg(test)]
mod room_broker_tests;
mod room_service;
#[cfg(test)]
mod test_support;

pub use connection_registry::{
    Connection, ConnectionRegistry, DeliveryOutcome, DropReason, RegistryError, RoleCounts,
};
pub use liveness::LivenessSweep;
pub use message_router::{decode_frame, FrameError};
pub use relay::{relay, RelayOutcome};
pub use room::{GraceMark, Room};
pub use room_broker::{GraceCheck, RoomBroker, RoomCounts, RoomError};

/// Frames queued for a single connection's socket writer.
#[derive(Debug, Clone)]
pub enum Outbound {
    /// A protocol message, serialized as a JSON text frame
    Message(Arc<ServerMessage>),
    /// A liveness probe, written as a WebSocket Ping frame
    Probe,
    /// Forced termination; the writer sends a Close frame and stops
    Close,
}

/// Everything that can change broker state. Processed strictly one at a time.
#[derive(Debug)]
pub enum BrokerEvent {
    Connected {
        connection_id: ConnectionId,
        sender: mpsc::Sender<Outbound>,
        client_addr: SocketAddr,
    },
    Frame {
        connection_id: ConnectionId,
        text: String,
    },
    LivenessAck {
        connection_id: ConnectionId,
    },
    Disconnected {
        connection_id: ConnectionId,
    },
    Snapshot {
        reply: oneshot::Sender<BrokerSnapshot>,
    },
}

/// Point-in-time view of broker state for the HTTP surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerSnapshot {
    pub connections: usize,
    pub producers: usize,
    pub viewers: usize,
    pub unregistered: usize,
    pub rooms: usize,
    pub paired_rooms: usize,
    pub available_rooms: usize,
    pub reconnecting_rooms: usize,
    #[serde(skip)]
    pub listing: Vec<RoomListing>,
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("signaling broker is not running")]
pub struct BrokerUnavailable;

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    pub liveness_interval: Duration,
    pub reconnect_grace: Duration,
    pub event_queue_capacity: usize,
    pub outbound_queue_capacity: usize,
    pub max_message_size: usize,
    pub protocol: ProtocolConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl BrokerConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            liveness_interval: Duration::from_secs(
                config.server.liveness_interval_secs.clamp(1, MAX_LIVENESS_INTERVAL_SECS),
            ),
            reconnect_grace: Duration::from_secs(
                config.server.reconnect_grace_secs.clamp(1, MAX_RECONNECT_GRACE_SECS),
            ),
            event_queue_capacity: config.server.event_queue_capacity.max(1),
            outbound_queue_capacity: config.server.outbound_queue_capacity.max(1),
            max_message_size: config.security.max_message_size,
            protocol: config.protocol.clone(),
        }
    }

    /// Liveness period actually scheduled; timers reject zero and far-future deadlines.
    pub fn liveness_period(&self) -> Duration {
        self.liveness_interval.clamp(
            Duration::from_millis(1),
            Duration::from_secs(MAX_LIVENESS_INTERVAL_SECS),
        )
    }

    /// Grace window actually scheduled after a producer disconnect.
    pub fn grace_window(&self) -> Duration {
        self.reconnect_grace
            .min(Duration::from_secs(MAX_RECONNECT_GRACE_SECS))
    }
}

/// The single owner of all signaling state.
///
/// Frames, liveness ticks and grace-expiry checks are all handled on the one task
/// running [`SignalingBroker::run`], so every transition is applied atomically with
/// respect to every other.
pub struct SignalingBroker {
    config: Arc<BrokerConfig>,
    registry: ConnectionRegistry,
    rooms: RoomBroker,
    grace_timers: DelayQueue<GraceCheck>,
    metrics: Arc<ServerMetrics>,
}

impl SignalingBroker {
    pub fn new(config: BrokerConfig, metrics: Arc<ServerMetrics>) -> Self {
        let registry = ConnectionRegistry::new(metrics.clone());
        let rooms = RoomBroker::new(metrics.clone());
        Self {
            config: Arc::new(config),
            registry,
            rooms,
            grace_timers: DelayQueue::new(),
            metrics,
        }
    }

    /// Start the broker on its own task and return the handle used to feed it.
    pub fn spawn(config: BrokerConfig, metrics: Arc<ServerMetrics>) -> BrokerHandle {
        let (events_tx, events_rx) = mpsc::channel(config.event_queue_capacity.max(1));
        let broker = Self::new(config, metrics.clone());
        let handle = BrokerHandle {
            events: events_tx,
            metrics,
            config: broker.config.clone(),
            started_at: std::time::Instant::now(),
        };

        tokio::spawn(broker.run(events_rx));
        handle
    }

    pub async fn run(mut self, mut events: mpsc::Receiver<BrokerEvent>) {
        let interval = self.config.liveness_period();
        let mut liveness = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            liveness_interval_secs = interval.as_secs(),
            reconnect_grace_secs = self.config.grace_window().as_secs(),
            "Signaling broker started"
        );

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
                _ = liveness.tick() => self.run_liveness_cycle(),
                Some(expired) = std::future::poll_fn(|cx| self.grace_timers.poll_expired(cx)),
                    if !self.grace_timers.is_empty() =>
                {
                    self.on_grace_expired(expired.into_inner());
                }
            }
            self.reap_closed_peers();
        }

        tracing::info!(
            connections = self.registry.len(),
            rooms = self.rooms.len(),
            "Signaling broker stopped"
        );
    }

    pub fn handle_event(&mut self, event: BrokerEvent) {
        match event {
            BrokerEvent::Connected {
                connection_id,
                sender,
                client_addr,
            } => {
                self.registry.accept(connection_id, sender, client_addr);
            }
            BrokerEvent::Frame {
                connection_id,
                text,
            } => self.handle_frame(connection_id, &text),
            BrokerEvent::LivenessAck { connection_id } => {
                self.registry.mark_alive(&connection_id);
            }
            BrokerEvent::Disconnected { connection_id } => {
                self.drop_connection(connection_id);
            }
            BrokerEvent::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
        }
    }

    /// Remove a connection and cascade the departure into its room.
    fn drop_connection(&mut self, connection_id: ConnectionId) {
        let Some(connection) = self.registry.remove(&connection_id) else {
            return;
        };

        tracing::info!(
            %connection_id,
            role = connection.role.map(|role| role.as_str()),
            client_addr = %connection.client_addr,
            connected_secs = connection.connected_for().num_seconds(),
            "Connection removed"
        );

        if let Some(check) = self.rooms.handle_departure(&mut self.registry, &connection) {
            let deadline = check.mark.disconnected_at + self.config.grace_window();
            self.grace_timers.insert_at(check, deadline);
        }
    }

    fn on_grace_expired(&mut self, check: GraceCheck) {
        self.rooms.expire_grace(&mut self.registry, &check);
    }

    /// Peers whose outbound queue turned out to be closed are treated as disconnected.
    fn reap_closed_peers(&mut self) {
        loop {
            let closed = self.registry.take_closed();
            if closed.is_empty() {
                break;
            }
            for connection_id in closed {
                tracing::debug!(%connection_id, "Reaping connection with closed outbound queue");
                self.drop_connection(connection_id);
            }
        }
    }

    fn snapshot(&self) -> BrokerSnapshot {
        let roles = self.registry.role_counts();
        let rooms = self.rooms.counts();
        BrokerSnapshot {
            connections: self.registry.len(),
            producers: roles.producers,
            viewers: roles.viewers,
            unregistered: roles.unregistered,
            rooms: rooms.total,
            paired_rooms: rooms.paired,
            available_rooms: rooms.available,
            reconnecting_rooms: rooms.reconnecting,
            listing: self.rooms.listing(),
        }
    }

    fn reply(&mut self, connection_id: ConnectionId, message: ServerMessage) {
        self.registry.deliver(&connection_id, message);
    }
}

/// Cloneable front door to a running [`SignalingBroker`].
#[derive(Clone)]
pub struct BrokerHandle {
    events: mpsc::Sender<BrokerEvent>,
    metrics: Arc<ServerMetrics>,
    config: Arc<BrokerConfig>,
    started_at: std::time::Instant,
}

impl BrokerHandle {
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        sender: mpsc::Sender<Outbound>,
        client_addr: SocketAddr,
    ) -> Result<(), BrokerUnavailable> {
        self.metrics.increment_connections();
        self.send(BrokerEvent::Connected {
            connection_id,
            sender,
            client_addr,
        })
        .await
    }

    pub async fn frame(
        &self,
        connection_id: ConnectionId,
        text: String,
    ) -> Result<(), BrokerUnavailable> {
        self.send(BrokerEvent::Frame {
            connection_id,
            text,
        })
        .await
    }

    pub async fn liveness_ack(&self, connection_id: ConnectionId) -> Result<(), BrokerUnavailable> {
        self.send(BrokerEvent::LivenessAck { connection_id }).await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), BrokerUnavailable> {
        self.metrics.decrement_active_connections();
        self.send(BrokerEvent::Disconnected { connection_id }).await
    }

    pub async fn snapshot(&self) -> Result<BrokerSnapshot, BrokerUnavailable> {
        let (reply, response) = oneshot::channel();
        self.send(BrokerEvent::Snapshot { reply }).await?;
        response.await.map_err(|_| BrokerUnavailable)
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    async fn send(&self, event: BrokerEvent) -> Result<(), BrokerUnavailable> {
        self.events.send(event).await.map_err(|_| BrokerUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::{settle, spawn_client, test_config};
    use super::*;
    use crate::protocol::{ClientRole, ListingStatus};
    use serde_json::json;

    #[tokio::test(start_paused = true)]
    async fn grace_expiry_closes_room_for_parked_viewer() {
        let handle = SignalingBroker::spawn(test_config(), Arc::new(ServerMetrics::new()));

        let mut producer = spawn_client(&handle, ClientRole::Producer).await;
        producer.send(&handle, json!({"type": "join_room", "roomId": "r2"})).await;
        let mut viewer = spawn_client(&handle, ClientRole::Viewer).await;
        viewer.send(&handle, json!({"type": "join_room", "roomId": "r2"})).await;
        settle(&handle).await;
        producer.drain_messages();

        handle.disconnect(producer.id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        let messages = viewer.drain_messages();
        assert!(messages
            .iter()
            .any(|m| matches!(m.as_ref(), ServerMessage::RobotDisconnected { .. })));

        tokio::time::sleep(test_config().reconnect_grace).await;
        let messages = viewer.drain_messages();
        let closed = messages
            .iter()
            .filter(|m| matches!(m.as_ref(), ServerMessage::RoomClosed { .. }))
            .count();
        assert_eq!(closed, 1);

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.rooms, 0);
        assert!(snapshot.listing.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_within_grace_keeps_room() {
        let handle = SignalingBroker::spawn(test_config(), Arc::new(ServerMetrics::new()));

        let producer = spawn_client(&handle, ClientRole::Producer).await;
        producer.send(&handle, json!({"type": "join_room", "roomId": "r1"})).await;
        let mut viewer = spawn_client(&handle, ClientRole::Viewer).await;
        viewer.send(&handle, json!({"type": "join_room", "roomId": "r1"})).await;

        handle.disconnect(producer.id).await.unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;

        let returning = spawn_client(&handle, ClientRole::Producer).await;
        returning.send(&handle, json!({"type": "join_room", "roomId": "r1"})).await;
        settle(&handle).await;

        tokio::time::sleep(test_config().reconnect_grace * 2).await;
        let messages = viewer.drain_messages();
        assert!(messages
            .iter()
            .any(|m| matches!(m.as_ref(), ServerMessage::RobotReconnected { .. })));
        assert!(!messages
            .iter()
            .any(|m| matches!(m.as_ref(), ServerMessage::RoomClosed { .. })));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.paired_rooms, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn solo_producer_room_disappears_after_grace() {
        let handle = SignalingBroker::spawn(test_config(), Arc::new(ServerMetrics::new()));

        let producer = spawn_client(&handle, ClientRole::Producer).await;
        producer.send(&handle, json!({"type": "join_room", "roomId": "r2"})).await;
        handle.disconnect(producer.id).await.unwrap();

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.reconnecting_rooms, 1);
        assert_eq!(snapshot.listing[0].status, ListingStatus::Reconnecting);

        tokio::time::sleep(test_config().reconnect_grace + Duration::from_secs(1)).await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.rooms, 0);
        assert_eq!(handle.metrics().snapshot().rooms.rooms_closed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn closed_outbound_queue_is_treated_as_disconnect() {
        let handle = SignalingBroker::spawn(test_config(), Arc::new(ServerMetrics::new()));

        let producer = spawn_client(&handle, ClientRole::Producer).await;
        producer.send(&handle, json!({"type": "join_room", "roomId": "r3"})).await;
        let viewer = spawn_client(&handle, ClientRole::Viewer).await;
        viewer.send(&handle, json!({"type": "join_room", "roomId": "r3"})).await;
        drop(viewer);

        // The next delivery to the viewer fails and evicts it.
        producer
            .send(&handle, json!({"type": "offer", "sdp": "v=0"}))
            .await;
        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.viewers, 0);
        assert_eq!(snapshot.available_rooms, 1);
        assert!(snapshot.listing.iter().all(|l| l.room_id == "r3"));
    }

    #[tokio::test]
    async fn snapshot_fails_once_broker_stops() {
        let (events_tx, events_rx) = mpsc::channel(4);
        let metrics = Arc::new(ServerMetrics::new());
        let handle = BrokerHandle {
            events: events_tx,
            metrics,
            config: Arc::new(BrokerConfig::default()),
            started_at: std::time::Instant::now(),
        };
        drop(events_rx);

        assert!(!handle.is_running());
        assert!(matches!(handle.snapshot().await, Err(BrokerUnavailable)));
    }

    #[test]
    fn broker_config_follows_file_config() {
        let mut config = Config::default();
        config.server.reconnect_grace_secs = 10;
        config.server.outbound_queue_capacity = 0;
        let broker_config = BrokerConfig::from_config(&config);

        assert_eq!(broker_config.reconnect_grace, Duration::from_secs(10));
        assert_eq!(broker_config.liveness_interval, Duration::from_secs(30));
        assert_eq!(broker_config.outbound_queue_capacity, 1);
        assert_eq!(broker_config.max_message_size, 65536);
    }

    #[test]
    fn broker_config_clamps_oversized_timers() {
        let mut config = Config::default();
        config.server.liveness_interval_secs = u64::MAX;
        config.server.reconnect_grace_secs = u64::MAX;
        let broker_config = BrokerConfig::from_config(&config);

        assert_eq!(
            broker_config.liveness_interval,
            Duration::from_secs(MAX_LIVENESS_INTERVAL_SECS)
        );
        assert_eq!(
            broker_config.reconnect_grace,
            Duration::from_secs(MAX_RECONNECT_GRACE_SECS)
        );
    }

    #[tokio::test]
    async fn unbounded_grace_still_schedules_room_expiry() {
        let mut config = test_config();
        config.reconnect_grace = Duration::MAX;
        let mut broker = SignalingBroker::new(config, Arc::new(ServerMetrics::new()));
        let (tx, _rx) = mpsc::channel(16);
        let producer = uuid::Uuid::new_v4();
        broker.handle_event(BrokerEvent::Connected {
            connection_id: producer,
            sender: tx,
            client_addr: "127.0.0.1:40200".parse().unwrap(),
        });
        for frame in [
            json!({"type": "register", "clientType": "producer"}),
            json!({"type": "join_room", "roomId": "r9"}),
        ] {
            broker.handle_event(BrokerEvent::Frame {
                connection_id: producer,
                text: frame.to_string(),
            });
        }

        broker.handle_event(BrokerEvent::Disconnected {
            connection_id: producer,
        });

        assert_eq!(broker.grace_timers.len(), 1);
        assert_eq!(broker.snapshot().reconnecting_rooms, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unbounded_liveness_interval_keeps_broker_running() {
        let mut config = test_config();
        config.liveness_interval = Duration::MAX;
        let handle = SignalingBroker::spawn(config, Arc::new(ServerMetrics::new()));

        let producer = spawn_client(&handle, ClientRole::Producer).await;
        producer.send(&handle, json!({"type": "join_room", "roomId": "r8"})).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert!(handle.is_running());
        assert_eq!(snapshot.producers, 1);
        assert_eq!(snapshot.rooms, 1);
    }
}
