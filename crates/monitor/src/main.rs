//! hydrowatch binary entry point
//!
//! Runs one analysis cycle over inputs staged by the archive and mail
//! collaborators and writes the JSON report.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hydrowatch_divert::{events_from_notices, ingest, DivertIndex, DivertNotice, RawDivertEvent};
use hydrowatch_monitor::{DeviceInput, MonitorConfig, Orchestrator, ReportMetrics, StagedDevice};

#[derive(Parser, Debug)]
#[command(name = "hydrowatch")]
#[command(about = "Hydrophone data coverage monitor with divert awareness")]
struct Args {
    /// Path to monitor configuration file
    #[arg(short, long, env = "HYDROWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// JSON array of devices with their archive listings
    #[arg(long)]
    devices: PathBuf,

    /// JSON array of divert notices ({subject, body})
    #[arg(long)]
    notices: Option<PathBuf>,

    /// JSON array of pre-parsed divert events
    #[arg(long)]
    events: Option<PathBuf>,

    /// Analysis time (RFC 3339), defaults to the current time
    #[arg(long)]
    now: Option<DateTime<Utc>>,

    /// Days analysed, ending today
    #[arg(long, env = "CHECK_LAST_N_DAYS")]
    check_last_n_days: Option<u32>,

    #[arg(long, env = "RECENT_WINDOW_DAYS")]
    recent_window_days: Option<u32>,

    /// Worker pool cap
    #[arg(long, env = "MAX_WORKERS")]
    max_workers: Option<usize>,

    /// Report path, stdout when omitted
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Prometheus textfile to write the cycle's gauges to
    #[arg(long, env = "HYDROWATCH_METRICS_FILE")]
    metrics_out: Option<PathBuf>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn load_config(args: &Args) -> anyhow::Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::load(path).map_err(|e| {
            error!(error = %e, path = %path.display(), "Failed to load config");
            e
        })?,
        None => MonitorConfig::default(),
    };

    if let Some(days) = args.check_last_n_days {
        config.analysis.check_window_days = days;
    }
    if let Some(days) = args.recent_window_days {
        config.analysis.recent_window_days = days;
    }
    if let Some(workers) = args.max_workers {
        config.workers.max_workers = workers;
    }
    config.validate()?;
    Ok(config)
}

fn build_divert_index(args: &Args, config: &MonitorConfig) -> anyhow::Result<DivertIndex> {
    let mapping = config.locations.validate();
    info!(
        names = mapping.total_locations,
        mapped = mapping.mapped_locations,
        hydrophones = mapping.total_hydrophone_codes,
        odp_sites = mapping.odp_sites,
        "Location mapping loaded"
    );
    if !mapping.unmapped_location_names.is_empty() {
        warn!(names = ?mapping.unmapped_location_names, "Notice locations with no hydrophones");
    }

    let mut events = Vec::new();

    if let Some(path) = &args.notices {
        let notices: Vec<DivertNotice> = read_json(path)?;
        let batch = events_from_notices(&notices, &config.locations);
        info!(
            notices = notices.len(),
            used = batch.notices_used,
            malformed = batch.malformed,
            unmapped = batch.unmapped_names.len(),
            events = batch.events.len(),
            "Parsed divert notices"
        );
        events.extend(batch.events);
    }

    if let Some(path) = &args.events {
        let raw: Vec<RawDivertEvent> = read_json(path)?;
        let result = ingest(raw);
        info!(
            events = result.events.len(),
            malformed = result.malformed,
            "Loaded divert events"
        );
        events.extend(result.events);
    }

    if args.notices.is_none() && args.events.is_none() {
        warn!("No divert inputs given, divert correlation disabled");
    }

    Ok(DivertIndex::build(&events))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let now = args.now.unwrap_or_else(Utc::now);

    info!(
        window_days = config.analysis.check_window_days,
        recent_days = config.analysis.recent_window_days,
        max_workers = config.workers.max_workers,
        now = %now,
        "Starting hydrowatch"
    );

    let staged: Vec<StagedDevice> = read_json(&args.devices)?;
    let devices: Vec<DeviceInput> = staged.into_iter().map(DeviceInput::from).collect();

    let divert = build_divert_index(&args, &config)?;

    let orchestrator = Orchestrator::new(config, divert);
    let statuses = orchestrator.run(devices, now).await;
    let report = orchestrator.report(statuses, now);

    info!(
        devices = report.summary.total,
        counts = ?report.summary.counts,
        diverted_locations = report.divert.currently_diverted,
        locations_with_periods = report.window_periods.len(),
        "Analysis cycle complete"
    );

    if let Some(path) = &args.metrics_out {
        let metrics = ReportMetrics::new()?;
        metrics.record(&report.summary, &report.divert);
        metrics.write_textfile(path)?;
        info!(path = %path.display(), "Wrote metrics textfile");
    }

    let json = serde_json::to_string_pretty(&report)?;

    match &args.output {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "Wrote report");
        }
        None => println!("{}", json),
    }

    Ok(())
}
