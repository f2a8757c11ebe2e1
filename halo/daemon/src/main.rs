//! halod - Audio-Safe LED Daemon
//!
//! Owns the LED strip and serves mood requests from unprivileged processes
//! over a Unix socket.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (needs root for /dev/spidev*)
//! sudo halod
//!
//! # Custom socket path and config file
//! sudo halod --socket /run/halo/led.sock --config /etc/halo/halo.toml
//!
//! # Dry run without hardware
//! halod --output simulated
//!
//! # DMA channel pinning needs a build with the ws281x feature
//! cargo build --release -p halo-daemon --features ws281x
//!
//! # Verbose logging
//! RUST_LOG=debug halod
//! ```
//!
//! # Signals
//!
//! - `SIGTERM` / `SIGINT`: Graceful shutdown (strip goes dark, socket removed)

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tracing::{error, info};

use halo_core::config::{resolve_config, ConfigOverrides, DaemonConfig, OutputKind};
use halo_core::driver::{Peripheral, SimulatedPeripheral, SpiPeripheral, Ws281xPeripheral};
use halo_core::LedDaemon;

/// halod - Audio-safe LED mood daemon
#[derive(Parser, Debug)]
#[command(name = "halod")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file path (default: /etc/halo/halo.toml if present)
    #[arg(short = 'c', long, env = "HALO_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Unix socket path for control connections
    #[arg(short = 's', long, value_name = "PATH")]
    socket: Option<PathBuf>,

    /// Output backend (ws281x, spi, simulated)
    #[arg(short = 'o', long, value_name = "KIND")]
    output: Option<OutputKind>,

    /// Number of pixels on the strip
    #[arg(short = 'n', long, value_name = "COUNT")]
    pixels: Option<usize>,

    /// Start even when not running as root
    #[arg(long)]
    allow_unprivileged: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "HALO_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        let mut overrides = ConfigOverrides::new();
        if let Some(path) = &self.socket {
            overrides = overrides.with_socket_path(path.clone());
        }
        if let Some(output) = self.output {
            overrides = overrides.with_output(output);
        }
        if let Some(n) = self.pixels {
            overrides = overrides.with_pixel_count(n);
        }
        overrides
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!("halod={level},halo_core={level}"))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .init();
}

/// Hardware access needs root; the simulated backend does not
fn check_privileges(config: &DaemonConfig, allow_unprivileged: bool, is_root: bool) -> Result<()> {
    if is_root || allow_unprivileged || config.device.output == OutputKind::Simulated {
        return Ok(());
    }
    anyhow::bail!(
        "halod must run as root to drive the {} output \
         (use --allow-unprivileged or --output simulated)",
        config.device.output
    )
}

fn peripheral_for(config: &DaemonConfig) -> Box<dyn Peripheral> {
    match config.device.output {
        OutputKind::Ws281x => Box::new(Ws281xPeripheral::from_config(&config.device)),
        OutputKind::Spi => Box::new(SpiPeripheral::from_config(&config.device)),
        OutputKind::Simulated => Box::new(SimulatedPeripheral::new()),
    }
}

/// SIGTERM and SIGINT streams, installed before anything needs cleaning up
struct ShutdownSignals {
    sigterm: Signal,
    sigint: Signal,
}

impl ShutdownSignals {
    fn install() -> Result<Self> {
        Ok(Self {
            sigterm: signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
            sigint: signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
        })
    }

    /// Resolve on the first SIGTERM or SIGINT, including one that arrived
    /// while the daemon was starting
    async fn recv(&mut self) {
        tokio::select! {
            _ = self.sigterm.recv() => info!("Received SIGTERM, initiating shutdown"),
            _ = self.sigint.recv() => info!("Received SIGINT, initiating shutdown"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!("halod starting");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("PID: {}", std::process::id());

    let config = resolve_config(args.config.as_deref(), &args.overrides())
        .context("Invalid LED configuration")?;
    if let Some(path) = &config.config_file_path {
        info!(config_path = ?path, "Config file");
    }

    check_privileges(
        &config,
        args.allow_unprivileged,
        nix::unistd::geteuid().is_root(),
    )?;

    let mut signals = ShutdownSignals::install()?;

    let peripheral = peripheral_for(&config);
    let daemon = LedDaemon::new(config)
        .start(peripheral.as_ref())
        .await
        .context("Failed to start LED daemon")?;

    signals.recv().await;

    match daemon.shutdown().await {
        Ok(_) => info!("halod stopped cleanly"),
        Err(e) => {
            error!(error = %e, "halod stopped with error");
            return Err(e.into());
        }
    }
    Ok(())
}
