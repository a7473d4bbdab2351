use crate::metrics::MetricsSnapshot;
use crate::protocol::RoomListing;
use crate::server::{BrokerHandle, BrokerSnapshot};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::handler::websocket_handler;

/// Create the Axum router with WebSocket support
pub fn create_router(cors_origins: &str) -> axum::Router<BrokerHandle> {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    // Parse CORS origins
    let cors = if cors_origins == "*" {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = cors_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<axum::http::HeaderValue>().ok())
            .collect();

        if origins.is_empty() {
            tracing::warn!("No valid CORS origins configured, using permissive CORS");
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    };

    // Producer clients dial the bare host, so the socket is also served at `/`.
    axum::Router::new()
        .route("/", get(websocket_handler))
        .route("/ws", get(websocket_handler))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
        .route("/robots", get(robots))
        .route("/api/robots", get(robots))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub connections: usize,
    pub rooms: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    #[serde(flatten)]
    pub broker: BrokerSnapshot,
    pub uptime_secs: u64,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct RobotsResponse {
    pub rooms: Vec<RoomListing>,
    /// Epoch milliseconds, matching `available_rooms`
    pub timestamp: i64,
}

/// Health check endpoint
async fn health_check(
    State(broker): State<BrokerHandle>,
) -> Result<Json<HealthResponse>, StatusCode> {
    let snapshot = broker.snapshot().await.map_err(|err| {
        tracing::error!(error = %err, "Health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;

    Ok(Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now(),
        uptime_secs: broker.uptime().as_secs(),
        connections: snapshot.connections,
        rooms: snapshot.rooms,
    }))
}

async fn stats(State(broker): State<BrokerHandle>) -> Result<Json<StatsResponse>, StatusCode> {
    let snapshot = broker
        .snapshot()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(StatsResponse {
        broker: snapshot,
        uptime_secs: broker.uptime().as_secs(),
        metrics: broker.metrics().snapshot(),
    }))
}

/// Rooms a viewer could join right now; same content as `get_rooms`.
async fn robots(State(broker): State<BrokerHandle>) -> Result<Json<RobotsResponse>, StatusCode> {
    let snapshot = broker
        .snapshot()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(RobotsResponse {
        rooms: snapshot.listing,
        timestamp: Utc::now().timestamp_millis(),
    }))
}
