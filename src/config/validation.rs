//! Configuration validation functions.

use super::Config;

/// Longest accepted liveness interval (one hour).
pub const MAX_LIVENESS_INTERVAL_SECS: u64 = 3_600;

/// Longest accepted reconnect grace window (one day).
pub const MAX_RECONNECT_GRACE_SECS: u64 = 86_400;

/// Reject configurations the broker cannot run with.
pub fn validate_config(config: &Config) -> anyhow::Result<()> {
    if config.server.liveness_interval_secs == 0 {
        anyhow::bail!("server.liveness_interval_secs must be at least 1 second");
    }

    if config.server.liveness_interval_secs > MAX_LIVENESS_INTERVAL_SECS {
        anyhow::bail!(
            "server.liveness_interval_secs must be at most {MAX_LIVENESS_INTERVAL_SECS} (configured: {})",
            config.server.liveness_interval_secs
        );
    }

    if config.server.reconnect_grace_secs == 0 {
        anyhow::bail!("server.reconnect_grace_secs must be at least 1 second");
    }

    if config.server.reconnect_grace_secs > MAX_RECONNECT_GRACE_SECS {
        anyhow::bail!(
            "server.reconnect_grace_secs must be at most {MAX_RECONNECT_GRACE_SECS} (configured: {})",
            config.server.reconnect_grace_secs
        );
    }

    if config.server.event_queue_capacity == 0 {
        anyhow::bail!("server.event_queue_capacity must be greater than zero");
    }

    if config.server.outbound_queue_capacity == 0 {
        anyhow::bail!("server.outbound_queue_capacity must be greater than zero");
    }

    if config.protocol.max_room_id_length == 0 {
        anyhow::bail!("protocol.max_room_id_length must be greater than zero");
    }

    if config.security.max_message_size < 256 {
        anyhow::bail!(
            "security.max_message_size must be at least 256 bytes (configured: {})",
            config.security.max_message_size
        );
    }

    Ok(())
}
