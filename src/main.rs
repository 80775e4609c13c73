//! Submission relay.
//!
//! # Architecture Overview
//!
//! ```text
//!     SDK client                      RELAY                          OpenRosa server
//!   ──────────────▶ ┌──────────┐   ┌───────────┐   ┌──────────────┐
//!     multipart     │  http    │──▶│  store    │   │  upstream    │──────────────▶
//!     batch         │  server  │   │ (surveys, │   │ communicator │  POST /submission
//!                   │          │──▶│  creds)   │──▶│ (auth, date, │
//!   ◀────────────── │ response │◀──────────────────│  deadline)   │◀──────────────
//!     status        └──────────┘                   └──────────────┘
//!
//!   Cross-cutting: config (+ hot reload), observability, security limits,
//!   lifecycle (startup, signals, shutdown), admin API
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use submission_relay::config::ConfigWatcher;
use submission_relay::lifecycle::startup;
use submission_relay::lifecycle::Shutdown;
use submission_relay::net::tls::load_tls_config;
use submission_relay::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "submission-relay")]
#[command(about = "Relays form submissions to OpenRosa servers", long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = startup::load(args.config.as_deref())?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "submission-relay starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        forms = config.forms.len(),
        base_path = %config.submission.base_path,
        timeout_ms = config.submission.timeout_ms,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // keep the watcher alive for the lifetime of the process
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, &config);
            (updates, Some(watcher.run()?))
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let listener_config = config.listener.clone();
    let admin_config = config.admin.clone();
    let startup::Assembled {
        server,
        submission_log,
    } = startup::assemble(config)?;

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signal();

    if admin_config.enabled {
        let admin_listener = TcpListener::bind(&admin_config.bind_address).await?;
        tracing::info!(address = %admin_listener.local_addr()?, "Admin API listening");
        let admin_app = server.admin_router();
        let mut admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            let result = axum::serve(admin_listener, admin_app)
                .with_graceful_shutdown(async move {
                    let _ = admin_shutdown.recv().await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    match &listener_config.tls {
        Some(tls) => {
            let rustls = load_tls_config(tls).await?;
            let listener = std::net::TcpListener::bind(&listener_config.bind_address)?;
            server
                .run_tls(listener, rustls, config_updates, shutdown.subscribe())
                .await?;
        }
        None => {
            let listener = TcpListener::bind(&listener_config.bind_address).await?;
            server
                .run(listener, config_updates, shutdown.subscribe())
                .await?;
        }
    }

    shutdown.drained(Duration::from_secs(5)).await;

    match submission_log.save_to_file() {
        Ok(()) => tracing::debug!(instances = submission_log.len(), "Submission log flushed"),
        Err(e) => tracing::error!(error = %e, "Failed to save submission log"),
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
