//! Shop resilience service.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id → trace → timeout → server-timing
//!                         → fault injection (dev/test only)
//!                         → principal
//!                         → idempotency guard (POST/PUT/PATCH) ──┐
//!                         → read-through cache (GET/HEAD) ───────┤ shared KeyedStore
//!                         → shop handlers                         │ (memory | redis)
//!                               │                                 │
//!                               ├─ payments ─▶ circuit breaker ─▶ provider
//!                               └─ lowStock ─▶ job dispatcher ──▶ queue (memory | redis)
//!
//!     Cross-cutting: config (TOML + hot reload), tracing, prometheus metrics,
//!                    /status health report, admin API, graceful shutdown
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use shop_resilience::config::{load_config, watcher::ConfigWatcher, ServiceConfig};
use shop_resilience::http::AppServer;
use shop_resilience::lifecycle::{build_services, Shutdown, StartupError};
use shop_resilience::observability::{logging, metrics};
use shop_resilience::shop::{sample_products, shop_router, ShopState, SimulatedGateway};

#[derive(Parser)]
#[command(name = "shop-resilience")]
#[command(about = "Resilience middleware for the shop backend", long_about = None)]
struct Args {
    /// Path to the TOML configuration file; defaults apply when omitted
    #[arg(short, long, env = "SHOP_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path).map_err(StartupError::from)?,
        None => ServiceConfig::default(),
    };

    logging::init_logging(&config.observability);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.environment,
        config = ?args.config,
        "shop-resilience starting"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = build_services(&config).await?;

    // Keep the watcher handle alive for the lifetime of the server.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    (updates, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let shop = ShopState::new(&services, SimulatedGateway::new()).with_products(sample_products());
    let server = AppServer::new(&config, services, shop_router(shop));

    let listener = TcpListener::bind(&config.listener.bind_address)
        .await
        .map_err(StartupError::from)?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
