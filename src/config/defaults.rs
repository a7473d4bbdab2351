//! Default value functions for configuration fields.
//!
//! These back the `#[serde(default = ...)]` attributes throughout the configuration
//! system so partially specified JSON documents fall back to the compiled-in values.

use super::logging::LogFormat;

// =============================================================================
// Port & Root Config
// =============================================================================

pub const fn default_port() -> u16 {
    3001
}

// =============================================================================
// Broker Defaults
// =============================================================================

/// Cadence of the server-to-client liveness probe (seconds).
pub const fn default_liveness_interval_secs() -> u64 {
    30
}

/// How long a room is held after its robot drops (seconds).
pub const fn default_reconnect_grace_secs() -> u64 {
    60
}

pub const fn default_event_queue_capacity() -> usize {
    1024
}

pub const fn default_outbound_queue_capacity() -> usize {
    64
}

// =============================================================================
// Protocol Defaults
// =============================================================================

pub const fn default_max_room_id_length() -> usize {
    crate::protocol::DEFAULT_MAX_ROOM_ID_LENGTH
}

// =============================================================================
// Logging Defaults
// =============================================================================

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "robot-signal.log".to_string()
}

pub fn default_rotation() -> String {
    "daily".to_string()
}

pub const fn default_enable_file_logging() -> bool {
    false
}

pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

// =============================================================================
// Security Defaults
// =============================================================================

pub fn default_cors_origins() -> String {
    "*".to_string()
}

pub const fn default_max_message_size() -> usize {
    65536 // 64KB
}
