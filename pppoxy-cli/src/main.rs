//! pppoxy: tunnels PPPoE discovery and session frames over a TCP connection
//!
//! The server side binds the interface facing the ISP; the client side binds
//! the interface facing the local PPP client and dials the server. Both run
//! until SIGINT or SIGTERM, then close every endpoint and link in order.

mod args;

use std::process;
use std::str::FromStr;
use std::sync::Arc;

use tracing::{error, info};

use pppoxy_capture::{CaptureEndpoint, EndpointKind};
use pppoxy_core::{Endianness, Error, FrameSink, Mode, Result};
use pppoxy_tunnel::{Proxy, ProxyConfig};

use crate::args::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    let level = match cli.verbose {
        0 => tracing::Level::INFO,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    if let Err(e) = run(cli).await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mode = Mode::from_str(&cli.mode)?;

    let config = match mode {
        Mode::Server => {
            let allowed_ip = cli.allowed_ip.ok_or_else(|| {
                Error::invalid_parameter(
                    "allowed-ip".to_string(),
                    "required in server mode".to_string(),
                )
            })?;
            ProxyConfig::server(cli.address.clone(), allowed_ip)
        }
        Mode::Client => ProxyConfig::client(cli.address.clone()),
    };

    let endian = Endianness::detect();

    let (discovery, discovery_frames) =
        CaptureEndpoint::open(&cli.interface, EndpointKind::Discovery, endian, mode)?;
    let (session, session_frames) =
        CaptureEndpoint::open(&cli.interface, EndpointKind::Session, endian, mode)?;
    let discovery = Arc::new(discovery);
    let session = Arc::new(session);

    let proxy = Proxy::new(
        config,
        Arc::clone(&discovery) as Arc<dyn FrameSink>,
        Arc::clone(&session) as Arc<dyn FrameSink>,
    );
    proxy.run(discovery_frames, session_frames).await?;

    info!(
        "PPPoE proxy started in {} mode on interface {}",
        mode, cli.interface
    );
    match mode {
        Mode::Server => info!("Listening on {}", cli.address),
        Mode::Client => info!("Connecting to {}", cli.address),
    }

    wait_for_shutdown().await?;
    info!("Shutting down...");

    proxy.close().await;
    discovery.close();
    session.close();
    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
    Ok(())
}
