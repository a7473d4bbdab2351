// WebSocket module - organized into focused submodules
//
// - handler: WebSocket upgrade handler (entry point)
// - connection: per-socket reader and writer tasks
// - sending: outbound queue item to WebSocket frame encoding
// - routes: router setup and the HTTP operator endpoints

mod connection;
mod handler;
mod routes;
mod sending;

pub use handler::websocket_handler;
pub use routes::{create_router, HealthResponse, RobotsResponse, StatsResponse};
