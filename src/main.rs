//! Command line driver for surveying instruments.
//!
//! ```text
//! rust_survey --config survey.toml horizontal-section --step 10
//! rust_survey --config survey.toml track --mode 5
//! RUST_LOG=debug rust_survey info
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_survey::adapters::{ReplayTransport, SerialTransport, Transport};
use rust_survey::config::Settings;
use rust_survey::instrument::{Capability, MeasureUnit};
use rust_survey::procedures::{HorizontalSection, StopSignal, Tracking, TrackingMode};
use rust_survey::session::TotalStation;
use rust_survey::writer::{CsvWriter, EchoWriter, Writer};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "survey.toml";

static SERIAL_PORT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^COM[0-9]+|^/dev/.*tty").unwrap_or_else(|_| unreachable!())
});

#[derive(Parser, Debug)]
#[command(name = "rust_survey", about = "Drive a total station or GNSS receiver")]
struct Cli {
    /// TOML configuration file; defaults apply when it does not exist.
    #[arg(long, env = "RUSTSURVEY_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Serial device or replay file, overrides the configuration.
    #[arg(long)]
    port: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Scan a horizontal section around the instrument.
    HorizontalSection {
        /// Step between points in degrees
        #[arg(long)]
        step: Option<f64>,
        /// Plane height in metres, measured on the first point when omitted
        #[arg(long)]
        elevation: Option<f64>,
    },
    /// Follow a prism and record its positions.
    Track {
        /// Tracking mode 0..=5
        #[arg(long)]
        mode: Option<u8>,
        /// EDM mode name
        #[arg(long)]
        edm: Option<String>,
        /// Stop after this many cycles
        #[arg(long)]
        cycles: Option<u64>,
    },
    /// Print instrument name, serial number and internal temperature.
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = Settings::load_from(&cli.config)
        .with_context(|| format!("loading configuration '{}'", cli.config.display()))?;
    if let Some(port) = cli.port.clone() {
        settings.instrument.port = port;
    }
    init_tracing(&settings.log_level);

    let stop = StopSignal::new();
    let ctrl_c = stop.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current exchange");
            ctrl_c.stop();
        }
    });

    let mut ts = open_station(&settings).await?;
    let outcome = run(&cli.command, &mut settings, &mut ts, stop).await;
    ts.close().await;
    outcome
}

async fn run(
    command: &Command,
    settings: &mut Settings,
    ts: &mut TotalStation,
    stop: StopSignal,
) -> Result<()> {
    match command {
        Command::HorizontalSection { step, elevation } => {
            if let Some(step) = step {
                settings.horizontal_section.step_deg = *step;
            }
            if elevation.is_some() {
                settings.horizontal_section.elevation = *elevation;
            }
            settings.validate()?;
            let report = HorizontalSection::new(ts, settings.section_settings(), stop)
                .run()
                .await
                .context("horizontal section failed")?;
            info!(
                "{} points at height {:.3} m, {} skipped",
                report.points.len(),
                report.height,
                report.skipped
            );
        }
        Command::Track { mode, edm, cycles } => {
            if let Some(mode) = mode {
                settings.tracking.mode = *mode;
            }
            if let Some(edm) = edm {
                settings.instrument.edm_mode = edm.clone();
            }
            if cycles.is_some() {
                settings.tracking.max_cycles = *cycles;
            }
            settings.validate()?;
            let tracking = settings.tracking_settings()?;
            if tracking.mode != TrackingMode::DistanceOnly && !ts.has(Capability::Atr) {
                warn!("{} has no ATR, aiming will be skipped", ts.unit().name());
            }
            let report = Tracking::new(ts, tracking, stop)
                .run()
                .await
                .context("tracking failed")?;
            info!("{} cycles, {} points", report.cycles, report.recorded);
        }
        Command::Info => {
            let name = ts.instrument_name().await?;
            let number = ts.instrument_no().await?;
            let temperature = ts.internal_temperature().await?;
            println!(
                "{} #{} {}",
                name.instrument_name.unwrap_or_else(|| ts.unit().name().to_string()),
                number.instrument_no.map(|n| n.to_string()).unwrap_or_default(),
                temperature
                    .internal_temp
                    .map(|t| format!("{t:.1} °C"))
                    .unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn open_station(settings: &Settings) -> Result<TotalStation> {
    let instrument = &settings.instrument;
    let unit = instrument.model.build();
    let transport = transport_for(&instrument.port, instrument, unit.as_ref());
    let writer: Box<dyn Writer> = match &settings.output.path {
        Some(path) => Box::new(CsvWriter::new(path, settings.writer_options())),
        None => Box::new(EchoWriter::new(settings.writer_options())),
    };
    let mut ts = TotalStation::new(unit.name().to_string(), unit, transport)
        .with_writer(writer)
        .with_poll_policy(settings.poll_policy());
    ts.open()
        .await
        .with_context(|| format!("opening '{}'", instrument.port))?;
    Ok(ts)
}

fn transport_for(
    port: &str,
    instrument: &rust_survey::config::InstrumentConfig,
    unit: &dyn MeasureUnit,
) -> Box<dyn Transport> {
    if SERIAL_PORT.is_match(port) {
        Box::new(
            SerialTransport::new(port, instrument.baud_rate)
                .with_timeout(Duration::from_millis(instrument.timeout_ms))
                .with_end_of_message(unit.end_of_message()),
        )
    } else {
        info!("'{}' is not a serial device, replaying it as a file", port);
        Box::new(ReplayTransport::new(port))
    }
}
