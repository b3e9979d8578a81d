//! Port Tracker
//!
//! Keeps the host switch's port forwarder in sync with the ports that
//! containers publish.
//!
//! # Usage
//! ```bash
//! # Run the tracker behind an HTTP API
//! port-tracker --api-url http://192.168.127.1:80 serve --listen 127.0.0.1:8090
//!
//! # One-off calls against the Exposure Service
//! port-tracker expose --host-ip 127.0.0.1 --host-port 8080
//! port-tracker unexpose --host-ip 127.0.0.1 --host-port 8080
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use port_tracker::config::{DEFAULT_API_URL, DEFAULT_TIMEOUT_SECS, HOST_SWITCH_IP};
use port_tracker::{
    server, ExposeRequest, ExposureApi, ExposureClient, PortBinding, Protocol, Tracker,
    TrackerConfig, UnexposeRequest,
};

// ============================================================
// CLI Definition
// ============================================================

#[derive(Parser)]
#[command(name = "port-tracker")]
#[command(about = "Container port exposure tracker", long_about = None)]
#[command(version)]
struct Cli {
    /// Exposure Service base URL
    #[arg(long, env = "EXPOSURE_API_URL", default_value = DEFAULT_API_URL)]
    api_url: String,

    /// Switch-side address exposed ports forward to
    #[arg(long, env = "HOST_SWITCH_IP", default_value = HOST_SWITCH_IP)]
    switch_ip: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "EXPOSURE_API_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the tracker over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8090")]
        listen: SocketAddr,
    },

    /// Expose a single host binding
    Expose {
        #[arg(long, default_value = "127.0.0.1")]
        host_ip: String,

        #[arg(long)]
        host_port: String,

        /// Protocol key suffix (tcp or udp)
        #[arg(long, default_value = "tcp")]
        protocol: String,
    },

    /// Unexpose a single host binding
    Unexpose {
        #[arg(long, default_value = "127.0.0.1")]
        host_ip: String,

        #[arg(long)]
        host_port: String,

        #[arg(long, default_value = "tcp")]
        protocol: String,
    },
}

// ============================================================
// Main Entry Point
// ============================================================

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose, cli.json);

    let config = TrackerConfig::new(&cli.api_url)
        .switch_ip(&cli.switch_ip)
        .request_timeout(Duration::from_secs(cli.timeout));

    match cli.command {
        Commands::Serve { listen } => serve(&config, listen).await,

        Commands::Expose { host_ip, host_port, protocol } => {
            let client = ExposureClient::new(&config)?;
            let binding = PortBinding::new(host_ip, host_port);
            let request = ExposeRequest {
                local: binding.local_addr(),
                remote: binding.remote_addr(&config.switch_ip),
                protocol: Protocol::from_port_key(&format!("{}/{}", binding.host_port, protocol)),
            };

            client
                .expose(&request)
                .await
                .with_context(|| format!("Failed to expose {}", binding))?;

            println!("Exposed {} -> {}", request.local, request.remote);
            Ok(())
        }

        Commands::Unexpose { host_ip, host_port, protocol } => {
            let client = ExposureClient::new(&config)?;
            let binding = PortBinding::new(host_ip, host_port);
            let request = UnexposeRequest {
                local: binding.local_addr(),
                protocol: Protocol::from_port_key(&format!("{}/{}", binding.host_port, protocol)),
            };

            client
                .unexpose(&request)
                .await
                .with_context(|| format!("Failed to unexpose {}", binding))?;

            println!("Unexposed {}", request.local);
            Ok(())
        }
    }
}

fn init_logging(verbose: bool, json: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn serve(config: &TrackerConfig, listen: SocketAddr) -> Result<()> {
    let tracker = Arc::new(Tracker::from_config(config)?);

    info!(
        api_url = %config.base_url,
        switch_ip = %config.switch_ip,
        "Starting port tracker"
    );

    let app = server::router(tracker.clone());

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!("Listening on {}", listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // State is not persisted; drop every exposure on the way out
    info!(containers = tracker.len(), "Shutting down, unexposing all ports");
    if let Err(e) = tracker.remove_all().await {
        error!(error = %e, "Failed to unexpose all ports");
        return Err(e.into());
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
}
