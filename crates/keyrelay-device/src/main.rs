//! keyrelay device service: entry point.
//!
//! Loads the config, opens the HID gadget, and serves the control page until
//! Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! keyrelay [OPTIONS]
//!
//! Options:
//!   --config <PATH>          Config file, TOML or legacy key=value [default: keyrelay.toml]
//!   --bind <ADDR>            Override http.bind_address
//!   --port <PORT>            Override http.port
//!   --hid-device <PATH>      Override hid.device
//!   --unbounded-ready-wait   Wait for the HID endpoint forever instead of timing out
//!   --dry-run                Log reports instead of writing to the gadget
//! ```
//!
//! Each option can also be set with the matching `KEYRELAY_*` environment
//! variable.  CLI values take precedence over the config file.
//!
//! # Architecture overview
//!
//! ```text
//! Browser  (HTML form, HTTP Basic auth)
//!       ↕
//! keyrelay  ← this process
//!   domain/          AppConfig, AlertEvent
//!   application/     AuthGate (lockout + credentials), TypeKeystrokesUseCase
//!   infrastructure/
//!     http_server/   accept loop, routes, lockout sweep
//!     hid_output/    /dev/hidg0 writer
//!     notifier/      webhook alerts
//!       ↕
//! Target computer  (sees a USB keyboard)
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use keyrelay_core::domain::{Clock, SystemClock};
use tracing::info;
use tracing_subscriber::EnvFilter;

use keyrelay_device::application::HidReportSink;
use keyrelay_device::domain::AppConfig;
use keyrelay_device::infrastructure::{
    hid_output::{DryRunHidSink, GadgetHidSink},
    http_server::{run_server, spawn_sweeper, ServerState},
    notifier::build_notifier,
    storage::load_config,
};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// keyrelay device service.
///
/// Serves an authenticated web form and types submitted commands on the
/// host through a USB HID gadget.
#[derive(Debug, Parser)]
#[command(
    name = "keyrelay",
    about = "Authenticated web form that types keystrokes over a USB HID gadget",
    version
)]
struct Cli {
    /// Config file.  `*.toml` is read as TOML, anything else as legacy
    /// `key=value` lines.  A missing file means defaults.
    #[arg(long, default_value = "keyrelay.toml", env = "KEYRELAY_CONFIG")]
    config: PathBuf,

    /// IP address to bind the HTTP listener to.
    #[arg(long, env = "KEYRELAY_BIND")]
    bind: Option<String>,

    /// HTTP listener port.
    #[arg(long, env = "KEYRELAY_PORT")]
    port: Option<u16>,

    /// HID gadget device node.
    #[arg(long, env = "KEYRELAY_HID_DEVICE")]
    hid_device: Option<PathBuf>,

    /// Wait for the HID endpoint without a time limit.
    #[arg(long, env = "KEYRELAY_UNBOUNDED_READY_WAIT")]
    unbounded_ready_wait: bool,

    /// Log reports instead of writing them to the gadget.
    #[arg(long, env = "KEYRELAY_DRY_RUN")]
    dry_run: bool,
}

impl Cli {
    /// Applies command-line overrides on top of the loaded config.
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(bind) = &self.bind {
            config.http.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.http.port = port;
        }
        if let Some(device) = &self.hid_device {
            config.hid.device = device.clone();
        }
        if self.unbounded_ready_wait {
            config.hid.ready_timeout_ms = 0;
        }
    }

    /// Loads the config file, applies overrides, and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// merged config is unusable.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }
}

/// Parses `bind_address:port` into a socket address.
fn bind_addr(config: &AppConfig) -> anyhow::Result<SocketAddr> {
    format!("{}:{}", config.http.bind_address, config.http.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid HTTP bind address: '{}:{}'",
                config.http.bind_address, config.http.port
            )
        })
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let dry_run = cli.dry_run;
    let config = cli.into_app_config()?;
    let addr = bind_addr(&config)?;

    info!(
        "keyrelay starting: http={addr}, page={}, hid={}{}",
        config.http.page_path(),
        config.hid.device.display(),
        if dry_run { " (dry run)" } else { "" }
    );

    // ── Graceful shutdown flag ────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    // ── Wiring ────────────────────────────────────────────────────────────────
    let sink: Arc<dyn HidReportSink> = if dry_run {
        Arc::new(DryRunHidSink)
    } else {
        Arc::new(GadgetHidSink::new(config.hid.device.clone()))
    };
    let notifier = build_notifier(&config.alerts.slack_webhook);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = Arc::new(ServerState::from_config(
        &config,
        sink,
        notifier,
        clock,
        Arc::clone(&running),
    ));

    let sweeper = spawn_sweeper(
        Arc::clone(state.gate()),
        config.lockout.sweep_interval(),
        Arc::clone(&running),
    );

    run_server(addr, state, running).await?;
    sweeper.abort();

    info!("keyrelay stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
