//! # Flight Telemetry
//!
//! Live view of flight computer telemetry received over a USB serial link.
//!
//! This application opens the flight computer's serial port, feeds every
//! `key:value` line through the session pipeline and renders a snapshot at a
//! fixed frame rate, either as a one-line status summary in the log or as one
//! JSON document per frame on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use flight_telemetry::config::Config;
use flight_telemetry::serial::{self, SerialConnector};
use flight_telemetry::session::SessionController;
use flight_telemetry::state::SessionSnapshot;

/// Seconds between status summaries in the log
const STATUS_INTERVAL_SECS: u32 = 1;

/// Channels shown in the status summary
const SUMMARY_ALTITUDE: &str = "agl_fused_m";
const SUMMARY_VELOCITY: &str = "vz_fused_mps";

#[derive(Parser, Debug)]
#[command(name = "flight-telemetry", version, about = "Live flight computer telemetry over serial")]
struct Args {
    /// Path to a TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device path (overrides the config file)
    #[arg(short, long)]
    port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Samples kept per channel
    #[arg(short, long)]
    window: Option<usize>,

    /// Snapshot rate in frames per second
    #[arg(long)]
    fps: Option<u32>,

    /// Echo every received line to stdout
    #[arg(long)]
    print_raw: bool,

    /// Print one JSON snapshot per frame to stdout
    #[arg(long)]
    json: bool,

    /// List available serial ports and exit
    #[arg(long)]
    list: bool,
}

impl Args {
    /// Config file (or defaults) with command-line overrides applied
    fn resolve_config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => Config::default(),
        };

        if let Some(port) = &self.port {
            config.serial.port = port.clone();
            config.serial.fallback_ports.clear();
        }
        if let Some(baud) = self.baud {
            config.serial.baud_rate = baud;
        }
        if let Some(window) = self.window {
            config.session.window = window;
        }
        if let Some(fps) = self.fps {
            config.display.fps = fps;
        }
        if self.print_raw {
            config.display.print_raw = true;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

/// One-line human summary of a snapshot
fn status_line(snapshot: &SessionSnapshot) -> String {
    let fmt_value = |v: Option<f64>| match v {
        Some(v) if v.is_finite() => format!("{:.2}", v),
        _ => "-".to_string(),
    };
    let event_count: usize = snapshot.events.values().map(Vec::len).sum();

    format!(
        "[{}] t={}s agl={} vz={} lockout={:?} samples={} events={}",
        snapshot.status,
        fmt_value(snapshot.elapsed()),
        fmt_value(snapshot.latest(SUMMARY_ALTITUDE)),
        fmt_value(snapshot.latest(SUMMARY_VELOCITY)),
        snapshot.flag("lockout"),
        snapshot.sample_count(),
        event_count
    )
}

/// Main entry point for the telemetry viewer
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Parse arguments, load and validate the config
///    - Set up logging to stderr so stdout stays clean for JSON
///    - Open the serial link and start the session
///
/// 2. **Main Loop**
///    - Take a snapshot every frame (1/fps)
///    - Print it as JSON, or log a status summary once per second
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Close the session, releasing the serial port
///
/// # Errors
///
/// Returns error if:
/// - The config file is unreadable or invalid
/// - No serial device can be opened at startup
///
/// # Examples
///
/// ```bash
/// cargo run --release -- --port /dev/ttyACM0 --json
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries raw lines and JSON snapshots
    let (writer, _guard) = tracing_appender::non_blocking(std::io::stderr());
    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    if args.list {
        let ports = serial::list_ports()?;
        if ports.is_empty() {
            println!("No serial ports found");
        }
        for port in ports {
            println!("{}", port);
        }
        return Ok(());
    }

    info!("Flight Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = args.resolve_config()?;
    let connector = Arc::new(SerialConnector::from_config(&config.serial));
    let session = SessionController::start(&config, connector)
        .context("Failed to open the flight computer link")?;

    let fps = config.display.fps;
    let mut frame = interval(Duration::from_secs_f64(1.0 / f64::from(fps)));
    frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let frames_per_status = u64::from(fps * STATUS_INTERVAL_SECS);

    info!("Rendering at {}Hz, press Ctrl+C to exit", fps);

    let mut frame_count: u64 = 0;

    loop {
        tokio::select! {
            _ = frame.tick() => {
                let snapshot = session.snapshot();
                frame_count += 1;

                if args.json {
                    match serde_json::to_string(&snapshot) {
                        Ok(json) => println!("{}", json),
                        Err(e) => warn!("Failed to encode snapshot: {}", e),
                    }
                } else if frame_count % frames_per_status == 0 {
                    info!("{}", status_line(&snapshot));
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.close();
    info!("Rendered {} frames", frame_count);

    Ok(())
}
