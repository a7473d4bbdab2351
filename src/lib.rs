#![cfg_attr(not(test), deny(clippy::panic))]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::similar_names
)]

//! # Robot Signal Server
//!
//! An in-memory WebSocket rendezvous and signaling relay that pairs one robot
//! video producer with one viewer per room, then forwards WebRTC offers, answers
//! and ICE candidates between them.
//!
//! No media passes through the server and nothing is persisted.

/// Server configuration and environment variables
pub mod config;

/// Structured logging configuration
pub mod logging;

/// Metrics collection and reporting
pub mod metrics;

/// WebSocket message protocol definitions
pub mod protocol;

/// Signaling broker: connection registry, rooms, liveness and relay
pub mod server;

/// WebSocket connection handling and HTTP endpoints
pub mod websocket;
