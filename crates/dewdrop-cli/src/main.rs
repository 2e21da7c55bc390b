//! `dewdrop` - indoor dew point poller.
//!
//! Reads the sensor board over a serial port or the local network, compares
//! its dew point with the outdoor value cached by the dewdrop service, sets
//! the board's warning light and submits the feed to the service.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dewdrop_core::{DeviceLink, HttpTransport, Orchestrator, SerialTransport, Transport};

mod cli;
mod client;
mod poller;
mod stats;

use cli::{Cli, Mode};
use client::ServerClient;
use poller::Poller;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cancel = CancellationToken::new();
    let transport = open_transport(&cli)?;
    let link = DeviceLink::from_boxed(transport).with_cancel(cancel.clone());
    info!("Running in {:?} mode on {}", cli.mode, link.describe());

    let server = Arc::new(ServerClient::new(&cli.server_url)?);
    let orchestrator = Orchestrator::new(link, server.clone(), server);
    let mut poller = Poller::new(orchestrator, Duration::from_secs(cli.interval));

    if cli.once {
        let report = poller.cycle().await?;
        info!("Cycle finished in {:.2?}", report.elapsed);
        return Ok(());
    }

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        info!("Shutdown requested");
        shutdown.cancel();
    });

    poller.run(&cancel).await;
    Ok(())
}

/// Pick the transport once, from the mode.
fn open_transport(cli: &Cli) -> Result<Box<dyn Transport>> {
    let transport: Box<dyn Transport> = match cli.mode {
        Mode::Usb => {
            let port = cli
                .port
                .as_deref()
                .context("--port is required in usb mode")?;
            Box::new(
                SerialTransport::open(port, cli.baud)
                    .with_context(|| format!("failed to open serial port {}", port))?,
            )
        }
        Mode::Wifi => {
            let url = cli
                .device_url
                .as_deref()
                .context("--device-url is required in wifi mode")?;
            Box::new(HttpTransport::new(url)?)
        }
    };
    Ok(transport)
}
