//! Courier agent entry point.
//!
//! Runs the agent runtime until interrupted, then shuts down cleanly so the
//! final ledger state reaches disk.

use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use courier_cli::{cli::Cli, config};
use courier_core::transfer_event_channel;
use courier_runtime::{CourierRuntime, DetachedEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let config = config::load(&cli)?;
    info!(
        client_id = %config.client_id,
        discovery = %config.discovery.base_url,
        control = %config.control.url,
        state_dir = %config.state.state_dir.display(),
        "starting courier agent"
    );

    let mut runtime = CourierRuntime::new(config, Arc::new(DetachedEngine)).await?;

    // The sender half feeds transfer-engine byte events into the runtime; it
    // must outlive the workers or the event pump stops early.
    let (_events_tx, events_rx) = transfer_event_channel();
    runtime.start(events_rx);

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    runtime.shutdown().await;

    Ok(())
}

/// Logging setup keyed on `--verbose`; `RUST_LOG` still takes precedence.
fn setup_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
