//! twinpipe: local request/response over named channels
//!
//! The server listens on two independent channels:
//! - `string-channel`: replies with the request text in uppercase
//! - `number-channel`: replies with the square of a decimal integer
//!
//! Features:
//! - One newline-terminated request and one response per connection
//! - Concurrent connections on every channel, bounded by a worker pool
//! - Graceful shutdown that lets in-flight exchanges finish
//! - A client that can fire many concurrent sessions at one channel
//! - Configuration via CLI arguments or TOML file

mod channel;
mod client;
mod config;
mod dispatcher;
mod error;
mod handler;
mod listener;
mod pool;
mod server;

use std::path::PathBuf;

use config::{Config, Mode, SendSettings, ServeSettings};
use server::Server;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match config.mode {
        Mode::Serve(settings) => run_server(config.socket_dir, settings),
        Mode::Send(settings) => run_client(config.socket_dir, settings),
    }
}

/// Serve both channels until SIGINT or SIGTERM
fn run_server(
    socket_dir: PathBuf,
    settings: ServeSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        socket_dir = %socket_dir.display(),
        min_workers = settings.min_workers,
        max_workers = settings.max_workers,
        timeout_ms = settings.timeout.as_millis() as u64,
        "Starting twinpipe server"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(settings.min_workers)
        .enable_all()
        .build()?;

    runtime.block_on(async move {
        let server = Server::new(socket_dir, settings)?;
        let shutdown = CancellationToken::new();

        let mut terminate = signal(SignalKind::terminate())?;
        let trigger = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!(error = %e, "Failed to listen for interrupt");
                    }
                }
                _ = terminate.recv() => {}
            }
            info!("Shutdown signal received");
            trigger.cancel();
        });

        server.run(shutdown).await?;
        Ok::<(), Box<dyn std::error::Error>>(())
    })
}

/// Run the requested client sessions and report failures
fn run_client(
    socket_dir: PathBuf,
    settings: SendSettings,
) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;

    let outcomes = runtime.block_on(client::run_sessions(
        &socket_dir,
        settings.channel,
        settings.sessions,
        settings.message.as_deref(),
        settings.timeout,
    ));

    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| o.result.is_err())
        .map(|o| format!("#{} {:?}", o.session, o.request))
        .collect();
    if !failed.is_empty() {
        return Err(format!(
            "{} of {} sessions failed: {}",
            failed.len(),
            settings.sessions,
            failed.join(", ")
        )
        .into());
    }

    info!(sessions = settings.sessions, "All sessions answered");

    Ok(())
}
