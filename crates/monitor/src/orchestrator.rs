//! Device orchestrator.
//!
//! Fans device analyses out over a bounded set of tokio tasks. The
//! capability table and divert index are built before fan-out and only
//! read afterwards; each task returns its result tagged with the device's
//! input position so results come back in input order.

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use hydrowatch_divert::DivertIndex;
use hydrowatch_metadata::CapabilityTable;

use crate::classifier::Classifier;
use crate::config::MonitorConfig;
use crate::coverage::{AnalysisWindow, CoverageAnalyzer};
use crate::error::ObservationFetchError;
use crate::observation::{resolve_observations, ListingEntry};
use crate::status::{AnalysisReport, DeviceStatus, StatusSummary};

/// One device's staged input for an analysis cycle.
#[derive(Debug, Clone)]
pub struct DeviceInput {
    pub device_code: String,
    pub location_code: String,
    pub observations: Result<Vec<ListingEntry>, ObservationFetchError>,
}

/// Device input as staged on disk by the listing collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct StagedDevice {
    pub device_code: String,
    pub location_code: String,
    #[serde(default)]
    pub files: Vec<ListingEntry>,
    /// Set when the archive listing could not be obtained
    #[serde(default)]
    pub fetch_error: Option<String>,
}

impl From<StagedDevice> for DeviceInput {
    fn from(staged: StagedDevice) -> Self {
        let observations = match staged.fetch_error {
            Some(message) => Err(ObservationFetchError::new(message)),
            None => Ok(staged.files),
        };
        DeviceInput {
            device_code: staged.device_code,
            location_code: staged.location_code,
            observations,
        }
    }
}

/// Analyse one device. Pure apart from logging.
pub fn analyze_device(
    config: &MonitorConfig,
    capabilities: &CapabilityTable,
    divert: &DivertIndex,
    input: DeviceInput,
    now: DateTime<Utc>,
) -> DeviceStatus {
    let DeviceInput {
        device_code,
        location_code,
        observations,
    } = input;

    let listing = match observations {
        Ok(listing) => listing,
        Err(e) => {
            error!(device = %device_code, error = %e, "Observation fetch failed");
            return DeviceStatus::failed(
                &device_code,
                &location_code,
                format!("API error: {}", e.message),
                divert.is_location_diverted(&location_code, now),
                divert.active_divert(&location_code, now).map(|p| p.start),
            );
        }
    };

    let today = now.date_naive();
    let expected = capabilities.expected_data_types(&device_code);
    debug!(
        device = %device_code,
        expected = ?expected,
        capability_override = capabilities.has_override(&device_code),
        "Expected data types"
    );
    let window = AnalysisWindow::new(today, config.analysis.check_window_days);
    let observations = resolve_observations(&listing, &expected, &window);

    let coverage = CoverageAnalyzer::new(&config.analysis).analyze(&expected, &observations, today);
    let verdict = Classifier::new(&config.analysis, &config.classification).classify(
        &coverage,
        divert,
        &location_code,
        now,
    );

    info!(
        device = %device_code,
        location = %location_code,
        status = %verdict.status,
        files = observations.len(),
        poor_days = coverage.full.poor_days,
        "Device analysed"
    );

    DeviceStatus::analysed(&device_code, &location_code, coverage, verdict)
}

pub struct Orchestrator {
    config: Arc<MonitorConfig>,
    capabilities: Arc<CapabilityTable>,
    divert: Arc<DivertIndex>,
}

impl Orchestrator {
    pub fn new(config: MonitorConfig, divert: DivertIndex) -> Self {
        let capabilities = Arc::new(config.capabilities.clone());
        Self {
            config: Arc::new(config),
            capabilities,
            divert: Arc::new(divert),
        }
    }

    /// Pool size for `devices` devices: the configured cap, never more than
    /// the device count.
    pub fn worker_count(&self, devices: usize) -> usize {
        self.config.workers.max_workers.min(devices).max(1)
    }

    /// Analyse every device, returning statuses in input order.
    ///
    /// A device whose task fails still gets an `error` status.
    pub async fn run(&self, devices: Vec<DeviceInput>, now: DateTime<Utc>) -> Vec<DeviceStatus> {
        let workers = self.worker_count(devices.len());
        info!(devices = devices.len(), workers, "Starting analysis cycle");

        let identities: Vec<(String, String)> = devices
            .iter()
            .map(|d| (d.device_code.clone(), d.location_code.clone()))
            .collect();
        let mut slots: Vec<Option<DeviceStatus>> = vec![None; devices.len()];

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks: JoinSet<(usize, DeviceStatus)> = JoinSet::new();

        for (slot, input) in devices.into_iter().enumerate() {
            let permit = match Arc::clone(&semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Worker pool closed, remaining devices not analysed");
                    break;
                }
            };
            let config = Arc::clone(&self.config);
            let capabilities = Arc::clone(&self.capabilities);
            let divert = Arc::clone(&self.divert);

            // Analysis is CPU-bound; keep it off the async workers
            tasks.spawn_blocking(move || {
                let _permit = permit;
                let status = analyze_device(&config, &capabilities, &divert, input, now);
                (slot, status)
            });
        }

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok((slot, status)) => slots[slot] = Some(status),
                Err(e) => error!(error = %e, "Device analysis task panicked"),
            }
        }

        slots
            .into_iter()
            .zip(identities)
            .map(|(status, (device_code, location_code))| {
                status.unwrap_or_else(|| {
                    warn!(device = %device_code, "No result for device");
                    DeviceStatus::failed(
                        &device_code,
                        &location_code,
                        "Error checking data: analysis did not complete".to_string(),
                        self.divert.is_location_diverted(&location_code, now),
                        self.divert.active_divert(&location_code, now).map(|p| p.start),
                    )
                })
            })
            .collect()
    }

    /// Assemble the cycle report from the device statuses.
    pub fn report(&self, devices: Vec<DeviceStatus>, now: DateTime<Utc>) -> AnalysisReport {
        let check_window_days = self.config.analysis.check_window_days;
        let window_start = now - Duration::days(i64::from(check_window_days));

        let window_periods = self
            .divert
            .all_periods_between(window_start, now, now)
            .into_iter()
            .map(|(loc, periods)| (loc.to_string(), periods.into_iter().cloned().collect()))
            .collect();

        AnalysisReport {
            generated_at: now,
            check_window_days,
            summary: StatusSummary::from_statuses(&devices),
            divert: self.divert.summary(),
            current_diverts: self.divert.current_all(),
            window_periods,
            mapping: self.config.locations.validate(),
            devices,
        }
    }
}
