use chess_server::config::Cli;
use clap::Parser;
use std::env;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let log_level = env::var("RUST_LOG").or_else(|_| env::var("LOG_LEVEL")).unwrap_or_else(|_| "info".to_owned());
    tracing_subscriber::fmt().with_env_filter(EnvFilter::new(log_level)).init();

    let cli = Cli::parse();
    let stop = Arc::new(AtomicBool::new(false));

    let shutdown_stop = Arc::clone(&stop);
    tokio::spawn(async move {
        shutdown_signal().await;
        shutdown_stop.store(true, std::sync::atomic::Ordering::Relaxed);
    });

    if let Err(e) = chess_server::run(cli, stop).await {
        tracing::error!(error = %e, "server exited with error");
        std::process::exit(1);
    }
    info!("exiting");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
