//! RPS Triad Game Server
//!
//! Authoritative server binary.
//!
//! ```text
//! rps-triad-server [port]
//! ```
//!
//! Settings come from `RPS_*` environment variables (and a `.env` file);
//! a port given on the command line overrides `RPS_BIND_ADDR`'s port.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rps_triad::{
    network::server::{GameServer, ServerConfig},
    TICK_RATE, VERSION,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = ServerConfig::from_env()?;
    if let Some(port) = std::env::args().nth(1) {
        let port: u16 = port
            .parse()
            .with_context(|| format!("Invalid port '{}'. Usage: rps-triad-server [port]", port))?;
        config = config.with_port(port);
    }

    init_tracing(&config.log_level);

    info!("RPS Triad Server v{}", VERSION);
    info!("Tick Rate: {} Hz (default {})", config.tick_rate, TICK_RATE);

    let mut server = GameServer::bind(config).await?;
    info!("Listening on port {}", server.local_addr().port());

    let shutdown = server.shutdown_sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown.send(());
        }
    });

    server.run().await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
