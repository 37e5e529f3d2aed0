use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use linkwatch::config::{Overrides, Settings, INDIVIDUAL_RATES};
use linkwatch::duration::{format_duration, parse_duration};
use linkwatch::{MonitorConfig, Orchestrator, RunSummary};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "linkwatch")]
#[command(about = "Measure loss, latency and outages on MAVLink telemetry links")]
struct Args {
    /// Connection descriptors (e.g. udpin:0.0.0.0:14550, tcp:10.0.0.2:5760, /dev/ttyUSB0:57600)
    #[arg(required = true, value_name = "CONNECTION")]
    connections: Vec<String>,

    /// Target system ID (autopilot)
    #[arg(long)]
    system_id: Option<u8>,

    /// Target component ID (autopilot)
    #[arg(long)]
    component_id: Option<u8>,

    /// Test duration, e.g. "300", "90s", "5m" (default: run until interrupted)
    #[arg(long, value_parser = parse_duration)]
    duration: Option<Duration>,

    /// Silence before a link counts as down, e.g. "1.5s" or "500ms" (default: 1.0s)
    #[arg(long, value_parser = parse_duration)]
    outage_timeout: Option<Duration>,

    /// Consecutive packets required to leave an outage (default: 3)
    #[arg(long)]
    recovery_hysteresis: Option<u32>,

    /// Directory for CSV output (default: output)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Rate for every telemetry stream in Hz, -1 to use the individual rates (default: 4)
    #[arg(long, allow_hyphen_values = true)]
    all_rates: Option<i32>,

    /// RAW_SENSORS stream rate in Hz (default: 4)
    #[arg(long)]
    rate_raw_sensors: Option<u16>,

    /// EXTENDED_STATUS stream rate in Hz (default: 4)
    #[arg(long)]
    rate_extended_status: Option<u16>,

    /// RC_CHANNELS stream rate in Hz (default: 4)
    #[arg(long)]
    rate_rc_channels: Option<u16>,

    /// POSITION stream rate in Hz (default: 4)
    #[arg(long)]
    rate_position: Option<u16>,

    /// EXTRA1 stream rate in Hz (default: 4)
    #[arg(long)]
    rate_extra1: Option<u16>,

    /// EXTRA2 stream rate in Hz (default: 4)
    #[arg(long)]
    rate_extra2: Option<u16>,

    /// EXTRA3 stream rate in Hz (default: 4)
    #[arg(long)]
    rate_extra3: Option<u16>,

    /// MAVLink 2 signing passphrase (hashed with SHA-256)
    #[arg(long)]
    signing_passphrase: Option<String>,

    /// MAVLink 2 signing link ID (default: the link's position in the list)
    #[arg(long)]
    signing_link_id: Option<u8>,

    /// TOML file with default settings
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the run summary to this JSON file
    #[arg(long)]
    summary_json: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. "debug", "linkwatch=trace")
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            system_id: self.system_id,
            component_id: self.component_id,
            duration: self.duration,
            outage_timeout: self.outage_timeout,
            recovery_hysteresis: self.recovery_hysteresis,
            output_dir: self.output_dir.clone(),
            all_rates: self.all_rates,
            rate_raw_sensors: self.rate_raw_sensors,
            rate_extended_status: self.rate_extended_status,
            rate_rc_channels: self.rate_rc_channels,
            rate_position: self.rate_position,
            rate_extra1: self.rate_extra1,
            rate_extra2: self.rate_extra2,
            rate_extra3: self.rate_extra3,
            signing_passphrase: self.signing_passphrase.clone(),
            signing_link_id: self.signing_link_id,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&args.log_level).context("Invalid --log-level")?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(false)
        .without_time()
        .init();

    let settings = Settings::load(args.config.as_deref(), &args.overrides())?;
    let config = settings.monitor_config()?;
    let duration = settings.run_duration()?;

    log_banner(&args.connections, &settings, &config, duration);

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));

    let summary = Orchestrator::new(args.connections.clone(), config, shutdown)
        .with_duration(duration)
        .execute()
        .await?;

    if let Some(path) = &args.summary_json {
        export_summary(&summary, path)?;
        info!("Summary written to {}", path.display());
    }
    Ok(())
}

fn log_banner(
    links: &[String],
    settings: &Settings,
    config: &MonitorConfig,
    duration: Option<Duration>,
) {
    info!("{}", "=".repeat(60));
    info!("MAVLink Link Tester");
    info!("{}", "=".repeat(60));
    info!(
        "Target: System {}, Component {}",
        config.target_system, config.target_component
    );
    info!("Links: {}", links.len());
    for (id, link) in links.iter().enumerate() {
        info!("  [{}] {}", id, link);
    }
    info!("Output directory: {}", config.output_dir.display());
    if settings.all_rates == INDIVIDUAL_RATES {
        let rates: Vec<String> = config
            .stream_rates
            .iter()
            .map(|(category, rate)| format!("{}={}Hz", category.name(), rate))
            .collect();
        info!("Stream rates: {}", rates.join(", "));
    } else {
        info!("Stream rates: all streams at {}Hz", settings.all_rates);
    }
    info!("Outage timeout: {}", format_duration(config.outage_timeout));
    info!("Recovery hysteresis: {} packets", config.recovery_hysteresis);
    if config.signing_key.is_some() {
        match config.signing_link_id {
            Some(link_id) => info!("MAVLink signing: enabled (link_id={})", link_id),
            None => info!("MAVLink signing: enabled (link_id per link)"),
        }
    }
    match duration {
        Some(d) => info!("Duration: {}", format_duration(d)),
        None => info!("Duration: until interrupted (Ctrl+C)"),
    }
    info!("{}", "=".repeat(60));
}

/// Cancel `shutdown` on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("Interrupted, shutting down...");
    shutdown.cancel();
}

fn export_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(summary)?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write summary to {}", path.display()))?;
    Ok(())
}
