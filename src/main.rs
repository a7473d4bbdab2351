#![cfg_attr(not(test), deny(clippy::panic))]

use clap::Parser;
use robot_signal_server::config;
use robot_signal_server::logging;
use robot_signal_server::metrics::ServerMetrics;
use robot_signal_server::server::{BrokerConfig, SignalingBroker};
use robot_signal_server::websocket;
use std::{net::SocketAddr, sync::Arc};

/// Robot Signal -- WebRTC signaling rendezvous for robot cameras and their viewers
#[derive(Parser, Debug)]
#[command(name = "robot-signal-server")]
#[command(about = "An in-memory WebSocket signaling relay pairing robot video producers with viewers")]
#[command(version)]
struct Cli {
    /// Validate configuration and exit without starting the server.
    #[arg(long, short = 'c', conflicts_with = "print_config")]
    validate_config: bool,

    /// Print the merged configuration to stdout (as JSON) and exit.
    #[arg(long, conflicts_with = "validate_config")]
    print_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load();

    if cli.print_config {
        let json = serde_json::to_string_pretty(&cfg)
            .map_err(|e| anyhow::anyhow!("Failed to serialize config: {e}"))?;
        println!("{json}");
        return Ok(());
    }

    let validation_result = config::validate_config(&cfg);

    if cli.validate_config {
        match validation_result {
            Ok(()) => {
                println!("Configuration validation passed");
                println!();
                println!("Configuration summary:");
                println!("  Port: {}", cfg.port);
                println!(
                    "  Liveness interval: {}s",
                    cfg.server.liveness_interval_secs
                );
                println!("  Reconnect grace: {}s", cfg.server.reconnect_grace_secs);
                println!("  Max message size: {} bytes", cfg.security.max_message_size);
                println!("  CORS origins: {}", cfg.security.cors_origins);
                return Ok(());
            }
            Err(e) => {
                eprintln!("Configuration validation failed:\n{e}");
                std::process::exit(1);
            }
        }
    }

    validation_result?;

    // Held for the life of the process so buffered file logs are flushed on exit.
    let _log_guard = logging::init_with_config(&cfg.logging);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let broker = SignalingBroker::spawn(
        BrokerConfig::from_config(&cfg),
        Arc::new(ServerMetrics::new()),
    );

    let app = websocket::create_router(&cfg.security.cors_origins).with_state(broker);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        %addr,
        cors_origins = %cfg.security.cors_origins,
        "Robot signal server started - WebSocket: / and /ws, Health: /health, Stats: /stats"
    );

    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
