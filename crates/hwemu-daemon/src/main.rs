//! hwemud: hardware emulator service.
//!
//! Hosts the emulated tty, i2c, spi and net devices.  At startup it creates
//! the devices listed in the config file, starts the async scheduler that
//! fires `timer:` pairs, and serves the line-based control protocol on TCP.
//!
//! # Usage
//!
//! ```text
//! hwemud [OPTIONS]
//!
//! Options:
//!   --config <PATH>     Config file [default: platform config dir]
//!   --bind <ADDR>       Control server bind address [default: from config]
//!   --port <PORT>       Control server port [default: from config]
//!   --tick-ms <MS>      Scheduler tick period [default: from config]
//!   --log-requests      Log every request handed to a device
//!   --log-responses     Log every response delivered by a device
//! ```
//!
//! # Environment variable overrides
//!
//! CLI args take precedence over environment variables, which take
//! precedence over the config file.
//!
//! | Variable              | Description                      |
//! |-----------------------|----------------------------------|
//! | `HWEMU_CONFIG`        | Config file path                 |
//! | `HWEMU_BIND`          | Control server bind address      |
//! | `HWEMU_PORT`          | Control server port              |
//! | `HWEMU_TICK_MS`       | Scheduler tick period (ms)       |
//! | `HWEMU_LOG_REQUESTS`  | `true` to log requests           |
//! | `HWEMU_LOG_RESPONSES` | `true` to log responses          |
//! | `RUST_LOG`            | Log filter; overrides `log_level`|

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hwemu_core::scheduler;
use hwemu_daemon::application::provision::provision;
use hwemu_daemon::infrastructure::adapters::{channel_emulator, AsyncFrame, DEFAULT_FRAME_CAPACITY};
use hwemu_daemon::infrastructure::control_server::ControlServer;
use hwemu_daemon::infrastructure::storage::config::{self, DaemonConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Hardware emulator service.
#[derive(Debug, Parser)]
#[command(
    name = "hwemud",
    about = "Emulated tty/i2c/spi/net devices answering from request/response pairs",
    version
)]
struct Cli {
    /// Config file path.  Defaults to `<config dir>/hwemu/config.toml`.
    #[arg(long, env = "HWEMU_CONFIG")]
    config: Option<PathBuf>,

    /// Control server bind address.
    #[arg(long, env = "HWEMU_BIND")]
    bind: Option<String>,

    /// Control server TCP port.
    #[arg(long, env = "HWEMU_PORT")]
    port: Option<u16>,

    /// Scheduler tick period in milliseconds.
    #[arg(long, env = "HWEMU_TICK_MS")]
    tick_ms: Option<u64>,

    /// Log every request handed to a device.
    #[arg(long, env = "HWEMU_LOG_REQUESTS")]
    log_requests: bool,

    /// Log every response delivered by a device.
    #[arg(long, env = "HWEMU_LOG_RESPONSES")]
    log_responses: bool,
}

impl Cli {
    /// Loads the config file and applies the command-line overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the config path cannot be determined or the file
    /// cannot be read or parsed.
    fn into_daemon_config(self) -> anyhow::Result<DaemonConfig> {
        let mut cfg = match &self.config {
            Some(path) => config::load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => config::load_config().context("failed to load config")?,
        };
        self.apply(&mut cfg);
        Ok(cfg)
    }

    fn apply(self, cfg: &mut DaemonConfig) {
        if let Some(bind) = self.bind {
            cfg.control.bind_address = bind;
        }
        if let Some(port) = self.port {
            cfg.control.port = port;
        }
        if let Some(tick_ms) = self.tick_ms {
            cfg.daemon.tick_ms = tick_ms;
        }
        cfg.daemon.log_requests |= self.log_requests;
        cfg.daemon.log_responses |= self.log_responses;
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// # What happens at startup
///
/// 1. CLI arguments are parsed and merged over the config file.
/// 2. `tracing_subscriber` is initialised; `RUST_LOG` wins over `log_level`.
/// 3. The emulator is built with a channel adapter per kind and the
///    configured devices are provisioned.
/// 4. The scheduler thread starts, and a task logs every async frame.
/// 5. A Ctrl+C handler clears the shared `running` flag.
/// 6. The control server accepts connections until the flag is cleared.
/// 7. The scheduler is stopped, then every device is deleted.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Cli::parse().into_daemon_config()?;

    // ── Logging setup ─────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.daemon.log_level)),
        )
        .init();

    info!(
        "hwemud starting: control={}, tick={} ms, {} device(s) configured",
        cfg.control.listen_addr(),
        cfg.daemon.tick_ms,
        cfg.devices.len()
    );

    // ── Emulator and provisioning ─────────────────────────────────────────────
    let (emulator, frames) = channel_emulator(cfg.daemon.trace(), DEFAULT_FRAME_CAPACITY);
    let emulator = Arc::new(emulator);
    provision(&emulator, &cfg.devices).context("failed to provision devices")?;

    let server = ControlServer::bind(&cfg.control.listen_addr(), Arc::clone(&emulator)).await?;

    let scheduler = scheduler::spawn(Arc::clone(&emulator), cfg.daemon.tick())
        .context("failed to start scheduler thread")?;
    let pump = tokio::spawn(log_frames(frames));

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, initiating graceful shutdown");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Main server loop ───────────────────────────────────────────────────────
    server.serve(running).await;

    scheduler.shutdown();
    emulator.shutdown();
    pump.abort();

    info!("hwemud stopped");
    Ok(())
}

/// Logs every unsolicited response delivered through the channel adapters.
async fn log_frames(mut frames: mpsc::Receiver<AsyncFrame>) {
    while let Some(frame) = frames.recv().await {
        info!(
            "{} async response: {} byte(s) {}",
            frame.device_name(),
            frame.bytes.len(),
            hex::encode(&frame.bytes)
        );
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
