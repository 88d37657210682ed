//! Task Flow relay server.
//!
//! An axum WebSocket server holding accounts and per-user task collections,
//! with live snapshot feeds for signed-in boards.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:9100
//! cargo run --bin taskflow-relay
//!
//! # Run on custom address
//! cargo run --bin taskflow-relay -- --bind 127.0.0.1:8080
//! ```

use std::sync::Arc;

use clap::Parser;
use taskflow_relay::config::{RelayCliArgs, RelayConfig};
use taskflow_relay::relay::{self, RelayState};

#[tokio::main]
async fn main() {
    let cli = RelayCliArgs::parse();

    let config = match RelayConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("taskflow-relay: {e}");
            std::process::exit(2);
        }
    };

    // Relay logs go to stderr; RUST_LOG overrides --log-level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(env_filter)
        .init();

    tracing::info!(
        addr = %config.bind_addr,
        max_payload_size = config.max_payload_size,
        max_feeds_per_connection = config.max_feeds_per_connection,
        "starting taskflow relay"
    );

    let state = Arc::new(RelayState::with_limits(
        config.max_payload_size,
        config.max_feeds_per_connection,
    ));

    match relay::start_server_with_state(&config.bind_addr.to_string(), state).await {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "relay server listening");
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "relay server task ended abnormally");
                std::process::exit(1);
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start relay server");
            std::process::exit(1);
        }
    }
}
