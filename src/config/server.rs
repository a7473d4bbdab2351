//! Broker behavior configuration types.

use super::defaults::{
    default_event_queue_capacity, default_liveness_interval_secs,
    default_outbound_queue_capacity, default_reconnect_grace_secs,
};
use serde::{Deserialize, Serialize};

/// Timing and queueing knobs for the signaling broker.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    /// Interval between liveness probe cycles (seconds). A connection that misses
    /// one full cycle is evicted.
    #[serde(default = "default_liveness_interval_secs", alias = "ping_interval")]
    pub liveness_interval_secs: u64,
    /// How long a room survives its robot disconnecting (seconds)
    #[serde(default = "default_reconnect_grace_secs", alias = "reconnection_window")]
    pub reconnect_grace_secs: u64,
    /// Capacity of the broker's inbound event queue
    #[serde(default = "default_event_queue_capacity")]
    pub event_queue_capacity: usize,
    /// Capacity of each connection's outbound frame queue
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            liveness_interval_secs: default_liveness_interval_secs(),
            reconnect_grace_secs: default_reconnect_grace_secs(),
            event_queue_capacity: default_event_queue_capacity(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
        }
    }
}
