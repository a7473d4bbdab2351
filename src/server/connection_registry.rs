use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::metrics::ServerMetrics;
use crate::protocol::{ClientRole, ConnectionId, ErrorCode, ServerMessage};

use super::Outbound;

/// One accepted transport channel.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    /// Set exactly once by `register`
    pub role: Option<ClientRole>,
    /// Stable robot label; only producers carry one
    pub producer_label: Option<String>,
    pub client_addr: SocketAddr,
    pub joined_at: DateTime<Utc>,
    pub last_liveness_ack: Instant,
    /// Cleared when a probe goes out, set again by the acknowledgment
    pub(crate) alive: bool,
    pub(crate) sender: mpsc::Sender<Outbound>,
}

impl Connection {
    pub fn is_registered(&self) -> bool {
        self.role.is_some()
    }

    pub fn connected_for(&self) -> chrono::Duration {
        Utc::now() - self.joined_at
    }

    /// Label announced to viewers for this producer.
    pub fn label(&self) -> String {
        self.producer_label
            .clone()
            .unwrap_or_else(|| self.id.to_string())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Connection {0} is not known")]
    NotFound(ConnectionId),
    #[error("Connection is already registered as {0}")]
    AlreadyRegistered(ClientRole),
    #[error("Invalid client type '{0}': expected producer or viewer")]
    InvalidRole(String),
}

impl RegistryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound(_) => ErrorCode::NotRegistered,
            Self::AlreadyRegistered(_) => ErrorCode::AlreadyRegistered,
            Self::InvalidRole(_) => ErrorCode::InvalidRole,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// The socket writer is gone; the peer is effectively disconnected
    Closed,
    /// The peer is not draining its queue fast enough
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Dropped(DropReason),
    NotFound,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleCounts {
    pub producers: usize,
    pub viewers: usize,
    pub unregistered: usize,
}

pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    /// Connections whose queue was found closed during delivery, awaiting removal
    closed_peers: Vec<ConnectionId>,
    metrics: Arc<ServerMetrics>,
}

impl ConnectionRegistry {
    pub fn new(metrics: Arc<ServerMetrics>) -> Self {
        Self {
            connections: HashMap::new(),
            closed_peers: Vec::new(),
            metrics,
        }
    }

    /// Track a freshly accepted channel. It has no role until `register`.
    pub fn accept(
        &mut self,
        id: ConnectionId,
        sender: mpsc::Sender<Outbound>,
        client_addr: SocketAddr,
    ) {
        let connection = Connection {
            id,
            role: None,
            producer_label: None,
            client_addr,
            joined_at: Utc::now(),
            last_liveness_ack: Instant::now(),
            alive: true,
            sender,
        };

        if self.connections.insert(id, connection).is_some() {
            warn!(connection_id = %id, "Connection id reused; replacing previous entry");
        }
        info!(connection_id = %id, %client_addr, "Connection accepted");
    }

    /// Bind a role exactly once.
    pub fn register(
        &mut self,
        id: &ConnectionId,
        raw_role: &str,
        label: Option<String>,
    ) -> Result<ClientRole, RegistryError> {
        let connection = self
            .connections
            .get_mut(id)
            .ok_or(RegistryError::NotFound(*id))?;

        if let Some(existing) = connection.role {
            return Err(RegistryError::AlreadyRegistered(existing));
        }

        let role = ClientRole::parse(raw_role)
            .ok_or_else(|| RegistryError::InvalidRole(raw_role.to_string()))?;

        connection.role = Some(role);
        connection.producer_label = match role {
            ClientRole::Producer => Some(label.unwrap_or_else(|| id.to_string())),
            ClientRole::Viewer => None,
        };

        info!(
            connection_id = %id,
            %role,
            robot_id = connection.producer_label.as_deref(),
            "Client registered"
        );
        Ok(role)
    }

    pub fn resolve(&self, id: &ConnectionId) -> Result<&Connection, RegistryError> {
        self.connections
            .get(id)
            .ok_or(RegistryError::NotFound(*id))
    }

    pub fn role_of(&self, id: &ConnectionId) -> Option<ClientRole> {
        self.connections.get(id).and_then(|connection| connection.role)
    }

    /// Best-effort send. Never waits for the peer.
    pub fn deliver(&mut self, id: &ConnectionId, message: ServerMessage) -> DeliveryOutcome {
        let kind = message.kind();
        let outcome = self.push(id, Outbound::Message(Arc::new(message)));
        if let DeliveryOutcome::Dropped(reason) = outcome {
            debug!(connection_id = %id, kind, ?reason, "Message dropped");
        }
        outcome
    }

    pub fn probe(&mut self, id: &ConnectionId) -> DeliveryOutcome {
        self.push(id, Outbound::Probe)
    }

    /// Ask the socket writer to close the channel.
    pub fn close(&mut self, id: &ConnectionId) -> DeliveryOutcome {
        self.push(id, Outbound::Close)
    }

    fn push(&mut self, id: &ConnectionId, frame: Outbound) -> DeliveryOutcome {
        let Some(connection) = self.connections.get(id) else {
            return DeliveryOutcome::NotFound;
        };

        match connection.sender.try_send(frame) {
            Ok(()) => DeliveryOutcome::Delivered,
            Err(TrySendError::Full(_)) => {
                self.metrics.increment_deliveries_dropped();
                warn!(connection_id = %id, "Outbound queue full; dropping frame");
                DeliveryOutcome::Dropped(DropReason::Full)
            }
            Err(TrySendError::Closed(_)) => {
                self.metrics.increment_deliveries_dropped();
                if !self.closed_peers.contains(id) {
                    self.closed_peers.push(*id);
                }
                DeliveryOutcome::Dropped(DropReason::Closed)
            }
        }
    }

    /// Drop the connection from the registry. The caller cascades into rooms.
    pub fn remove(&mut self, id: &ConnectionId) -> Option<Connection> {
        self.closed_peers.retain(|closed| closed != id);
        self.connections.remove(id)
    }

    /// Record a liveness acknowledgment.
    pub fn mark_alive(&mut self, id: &ConnectionId) -> bool {
        match self.connections.get_mut(id) {
            Some(connection) => {
                connection.alive = true;
                connection.last_liveness_ack = Instant::now();
                true
            }
            None => false,
        }
    }

    pub(crate) fn get_mut(&mut self, id: &ConnectionId) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.keys().copied().collect()
    }

    pub fn take_closed(&mut self) -> Vec<ConnectionId> {
        std::mem::take(&mut self.closed_peers)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn role_counts(&self) -> RoleCounts {
        self.connections
            .values()
            .fold(RoleCounts::default(), |mut counts, connection| {
                match connection.role {
                    Some(ClientRole::Producer) => counts.producers += 1,
                    Some(ClientRole::Viewer) => counts.viewers += 1,
                    None => counts.unregistered += 1,
                }
                counts
            })
    }
}
