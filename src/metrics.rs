use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide counters for the signaling broker.
///
/// Counters are monotonic except `active_connections`. All updates use relaxed
/// ordering; readers only ever see an approximate snapshot.
#[derive(Debug, Default)]
pub struct ServerMetrics {
    // Connection metrics
    pub total_connections: AtomicU64,
    pub active_connections: AtomicU64,
    pub disconnections: AtomicU64,

    // Room metrics
    pub rooms_created: AtomicU64,
    pub rooms_closed: AtomicU64,
    pub pairings: AtomicU64,
    pub producer_reconnections: AtomicU64,

    // Signaling metrics
    pub frames_received: AtomicU64,
    pub messages_relayed: AtomicU64,
    pub relays_dropped: AtomicU64,
    pub deliveries_dropped: AtomicU64,

    // Liveness metrics
    pub liveness_probes: AtomicU64,
    pub liveness_evictions: AtomicU64,

    // Error metrics
    pub protocol_errors: AtomicU64,
    pub handler_faults: AtomicU64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub connections: ConnectionMetrics,
    pub rooms: RoomMetrics,
    pub signaling: SignalingMetrics,
    pub liveness: LivenessMetrics,
    pub errors: ErrorMetrics,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMetrics {
    pub total_connections: u64,
    pub active_connections: u64,
    pub disconnections: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RoomMetrics {
    pub rooms_created: u64,
    pub rooms_closed: u64,
    pub pairings: u64,
    pub producer_reconnections: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SignalingMetrics {
    pub frames_received: u64,
    pub messages_relayed: u64,
    pub relays_dropped: u64,
    pub deliveries_dropped: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LivenessMetrics {
    pub probes_sent: u64,
    pub evictions: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMetrics {
    pub protocol_errors: u64,
    pub handler_faults: u64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // Connection metrics
    pub fn increment_connections(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decrement_active_connections(&self) {
        // Check-then-decrement so a duplicate disconnect cannot wrap to u64::MAX
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                current.checked_sub(1)
            });
        self.disconnections.fetch_add(1, Ordering::Relaxed);
    }

    // Room metrics
    pub fn increment_rooms_created(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_rooms_closed(&self) {
        self.rooms_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_pairings(&self) {
        self.pairings.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_producer_reconnections(&self) {
        self.producer_reconnections.fetch_add(1, Ordering::Relaxed);
    }

    // Signaling metrics
    pub fn increment_frames_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_messages_relayed(&self) {
        self.messages_relayed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_relays_dropped(&self) {
        self.relays_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deliveries_dropped(&self) {
        self.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
    }

    // Liveness metrics
    pub fn add_liveness_probes(&self, count: u64) {
        self.liveness_probes.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_liveness_evictions(&self) {
        self.liveness_evictions.fetch_add(1, Ordering::Relaxed);
    }

    // Error metrics
    pub fn increment_protocol_errors(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_handler_faults(&self) {
        self.handler_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        MetricsSnapshot {
            timestamp: chrono::Utc::now(),
            connections: ConnectionMetrics {
                total_connections: load(&self.total_connections),
                active_connections: load(&self.active_connections),
                disconnections: load(&self.disconnections),
            },
            rooms: RoomMetrics {
                rooms_created: load(&self.rooms_created),
                rooms_closed: load(&self.rooms_closed),
                pairings: load(&self.pairings),
                producer_reconnections: load(&self.producer_reconnections),
            },
            signaling: SignalingMetrics {
                frames_received: load(&self.frames_received),
                messages_relayed: load(&self.messages_relayed),
                relays_dropped: load(&self.relays_dropped),
                deliveries_dropped: load(&self.deliveries_dropped),
            },
            liveness: LivenessMetrics {
                probes_sent: load(&self.liveness_probes),
                evictions: load(&self.liveness_evictions),
            },
            errors: ErrorMetrics {
                protocol_errors: load(&self.protocol_errors),
                handler_faults: load(&self.handler_faults),
            },
        }
    }
}
