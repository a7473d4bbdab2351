use crate::protocol::{ConnectionId, ServerMessage};

use super::connection_registry::{ConnectionRegistry, DeliveryOutcome};
use super::SignalingBroker;

/// Result of one liveness cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LivenessSweep {
    pub probed: usize,
    /// Connections that never answered the previous probe
    pub evicted: Vec<ConnectionId>,
}

/// Probe every connection, collecting those that missed the previous probe.
///
/// Evicted connections are sent a close request but stay in the registry; the
/// caller removes them so the room cascade runs. A connection whose queue is
/// full is skipped for this cycle and keeps its liveness flag.
pub fn sweep(registry: &mut ConnectionRegistry) -> LivenessSweep {
    let mut result = LivenessSweep::default();

    for connection_id in registry.ids() {
        let Some(connection) = registry.get_mut(&connection_id) else {
            continue;
        };

        if !connection.alive {
            result.evicted.push(connection_id);
            continue;
        }

        // Only a queued probe is awaited; a full queue retries next cycle.
        if registry.probe(&connection_id) == DeliveryOutcome::Delivered {
            if let Some(connection) = registry.get_mut(&connection_id) {
                connection.alive = false;
            }
            result.probed += 1;
        }
    }

    for connection_id in &result.evicted {
        registry.close(connection_id);
    }

    result
}

impl SignalingBroker {
    pub(super) fn run_liveness_cycle(&mut self) {
        let result = sweep(&mut self.registry);
        self.metrics.add_liveness_probes(result.probed as u64);

        for connection_id in result.evicted {
            tracing::warn!(%connection_id, "Connection missed liveness probe; terminating");
            self.metrics.increment_liveness_evictions();
            self.drop_connection(connection_id);
        }
    }

    /// Answer a client keepalive. Independent of the probe cycle.
    pub(super) fn handle_keepalive(
        &mut self,
        connection_id: ConnectionId,
        client_timestamp: Option<serde_json::Value>,
    ) {
        self.reply(
            connection_id,
            ServerMessage::Pong {
                timestamp: chrono::Utc::now().timestamp_millis(),
                client_timestamp,
            },
        );
    }
}
