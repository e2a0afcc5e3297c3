use std::sync::Arc;

use clap::Parser;
use percolate_core::PercolateConfig;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

use percolate_server::{server, GatewayContext};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "percolate.toml")]
    config: String,

    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Init logging
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    // Load config
    let config = match PercolateConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    if args.health {
        match server::ping_socket(&config.service.socket_path).await {
            Ok(()) => println!("✅ Percolate gateway reachable at {}", config.service.socket_path),
            Err(e) => {
                println!("❌ Percolate gateway unreachable: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let ctx = Arc::new(GatewayContext::new(config.clone()));

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to listen for Ctrl+C");
        tracing::info!("Shutdown signal received");
        let _ = shutdown_tx.send(());
    });

    // Background sweep: evict presence entries idle past the configured window
    let sweeper_tracker = ctx.presence.clone();
    let sweep_interval = config.presence.sweep_interval_seconds;
    let sweeper_shutdown = tx.subscribe();
    tokio::spawn(async move {
        percolate_server::subsystems::presence::run_presence_sweeper(
            sweeper_tracker,
            sweep_interval,
            sweeper_shutdown,
        )
        .await;
    });

    // HTTP REST API server, if enabled
    if config.http.enabled {
        let http_ctx = ctx.clone();
        let http_shutdown = tx.subscribe();
        tokio::spawn(async move {
            if let Err(e) = percolate_server::http::start_http_server(http_ctx, http_shutdown).await
            {
                tracing::error!("HTTP server error: {}", e);
            }
        });
    }

    let socket_path = config.service.socket_path.clone();
    server::run_unix_server(&socket_path, ctx, tx.subscribe()).await?;

    Ok(())
}
