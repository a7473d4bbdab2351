//! Configuration module for the robot signaling server.
//!
//! Configuration is layered: compiled-in defaults, then JSON files, stdin and inline
//! JSON, then `ROBOT_SIGNAL__*` field overrides.
//!
//! # Module Structure
//!
//! - [`crate::config::types`]: Root `Config` struct
//! - [`server`]: Broker timing and queue sizing
//! - [`protocol`]: Limits on client-supplied identifiers
//! - [`security`]: CORS and frame size limits
//! - [`logging`]: Logging configuration
//! - [`crate::config::loader`]: Configuration loading functions
//! - [`crate::config::validation`]: Configuration validation functions
//! - [`crate::config::defaults`]: Default value functions

// Submodules
pub mod defaults;
pub mod loader;
pub mod logging;
pub mod protocol;
pub mod security;
pub mod server;
pub mod types;
pub mod validation;

// Re-exports for convenience
pub use loader::{load, load_from, ConfigSources};

pub use logging::{LogFormat, LogLevel, LoggingConfig};

pub use protocol::ProtocolConfig;

pub use security::SecurityConfig;

pub use server::ServerConfig;

pub use types::Config;

pub use validation::{validate_config, MAX_LIVENESS_INTERVAL_SECS, MAX_RECONNECT_GRACE_SECS};
