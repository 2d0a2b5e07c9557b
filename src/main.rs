//! Fallback Proxy
//!
//! A reverse proxy built with Tokio and Axum that can hand a request over to
//! a fallback service when the primary service answers with a configured
//! status code.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!     ─────────▶ http server ─▶ routing ─▶ service (primary)
//!                                              │
//!                                              ▼
//!                                     load_balancer + pool ─▶ backend
//!                                              │
//!                          response headers ◀──┘
//!                                 │
//!                     fallback hooks: condition matches?
//!                        │ no                    │ yes
//!                        ▼                       ▼
//!                 stream response        adopt into fallback service
//!                                         ─▶ fallback backend ─▶ response
//!                                 │
//!                     restore owner ─▶ stats, metrics, access log
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use fallback_proxy::config::load_config;
use fallback_proxy::lifecycle::signals::shutdown_on_signal;
use fallback_proxy::observability::{logging, metrics};
use fallback_proxy::{HttpServer, Shutdown};

#[derive(Parser)]
#[command(name = "fallback-proxy", version)]
#[command(about = "Reverse proxy with conditional service fallback", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "FALLBACK_PROXY_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args.config)?;

    if args.check {
        println!("{}: configuration ok ({} services)", args.config.display(), config.services.len());
        return Ok(());
    }

    logging::init(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), config = %args.config.display(), "fallback-proxy starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        max_connections = config.listener.max_connections,
        request_timeout_secs = config.timeouts.request_secs,
        "Listening for connections"
    );

    let server = HttpServer::new(config)?;
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(shutdown_on_signal(shutdown));

    server.run(listener, server_shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
