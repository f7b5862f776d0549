//! Slingshot Proxy
//!
//! Lets browser-hosted clients make HTTP requests that CORS would otherwise
//! block.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                SLINGSHOT PROXY                │
//!     Browser Request     │  ┌─────────┐   ┌──────────┐   ┌───────────┐  │
//!     ────────────────────┼─▶│  http   │──▶│  model   │──▶│loop_guard │  │
//!                         │  │ server  │   │ (parse)  │   │  (gate)   │  │
//!                         │  └─────────┘   └──────────┘   └─────┬─────┘  │
//!                         │                                     ▼        │
//!     Envelope / bytes /  │  ┌──────────┐  ┌──────────┐   ┌───────────┐  │
//!     event stream        │  │ response │◀─│ classify │◀──│ executor  │◀─┼──── Target
//!     ◀───────────────────┼──│  render  │  │ + stream │   │ (reqwest) │  │     Server
//!                         │  └──────────┘  └──────────┘   └───────────┘  │
//!                         │                                              │
//!                         │  config · observability · lifecycle · files  │
//!                         └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use slingshot_proxy::config::{load_config, ProxyConfig};
use slingshot_proxy::lifecycle::{signals, Shutdown};
use slingshot_proxy::observability::{logging, metrics};
use slingshot_proxy::{HttpServer, VERSION};

#[derive(Debug, Parser)]
#[command(name = "slingshot-proxy", version, about = "HTTP forwarding proxy for browser clients")]
struct Cli {
    /// Port to listen on.
    #[arg(short, long)]
    port: Option<u16>,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Serve local files through /file and /dir.
    #[arg(long)]
    enable_local_files: bool,

    /// Extra hostnames to block, one per line.
    #[arg(long, value_name = "PATH")]
    enable_blacklist: Option<PathBuf>,

    /// Verbose (debug) logging.
    #[arg(short, long)]
    logging: bool,
}

impl Cli {
    fn apply(&self, config: &mut ProxyConfig) {
        if let Some(port) = self.port {
            config.set_port(port);
        }
        if self.enable_local_files {
            config.features.local_files = true;
        }
        if let Some(path) = &self.enable_blacklist {
            config.loop_guard.blocklist_file = Some(path.clone());
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };
    cli.apply(&mut config);

    logging::init(&config.observability, cli.logging);
    tracing::info!(version = VERSION, "slingshot-proxy starting");

    tracing::info!(
        bind_address = %config.listener.bind_address,
        default_timeout_secs = config.timeouts.default_request_secs,
        max_timeout_secs = config.timeouts.max_request_secs,
        "Configuration loaded"
    );

    if config.features.local_files {
        tracing::warn!("Local file access is ENABLED: any page that can reach this proxy can read your files");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr)?,
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config)?;

    // Bind TCP listener
    let listener = TcpListener::bind(&server.config().listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let mut server_task = tokio::spawn(server.run(listener, server_shutdown));

    tokio::select! {
        _ = signals::wait_for_signal() => {
            shutdown.trigger();
            server_task.await??;
        }
        result = &mut server_task => result??,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
