use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::config::TurnstileConfig;
use turnstile::http::{router, HttpServer};
use turnstile::ratelimit::{spawn_sweeper, RateLimiter};

/// Per-client token-bucket admission control.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long, env = "TURNSTILE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if args.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.http_addr {
        config.server.http_addr = addr;
    }
    info!(
        http_addr = %config.server.http_addr,
        window_ms = config.rate_limiting.window_ms,
        max_requests = config.rate_limiting.max_requests,
        "Configuration loaded"
    );

    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limiting.limit_config())?);
    info!("Rate limiter initialized");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = spawn_sweeper(
        rate_limiter.clone(),
        config.rate_limiting.sweeper_config(),
        shutdown_rx,
    );

    let app = router(rate_limiter, &config.server.allowed_origins);
    let server = HttpServer::bind(config.server.http_addr, app).await?;

    // Run the server until Ctrl+C or SIGTERM, stopping the sweeper first
    server
        .serve_with_shutdown(stop_sweeper_on(shutdown_signal(), shutdown_tx))
        .await?;

    sweeper.await?;

    info!("Turnstile stopped");
    Ok(())
}

/// Wait for `signal`, then tell the bucket sweeper to stop.
///
/// Resolving this future also starts the HTTP server's drain.
async fn stop_sweeper_on<F>(signal: F, sweeper_stop: watch::Sender<bool>)
where
    F: Future<Output = ()>,
{
    signal.await;
    if sweeper_stop.send(true).is_err() {
        warn!("Bucket sweeper exited before shutdown");
    }
    info!("Draining HTTP connections");
}

/// Wait for Ctrl+C or SIGTERM.
///
/// A handler that cannot be installed is logged and never fires; the other
/// one still can.
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
