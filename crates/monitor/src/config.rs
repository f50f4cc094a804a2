use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use hydrowatch_metadata::{CapabilityTable, LocationMapping};

use crate::error::{MonitorError, Result};

/// Monitor configuration, loaded from YAML.
///
/// Every section is optional and falls back to the built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub analysis: AnalysisConfig,
    pub classification: ClassificationThresholds,
    pub workers: WorkerConfig,
    pub capabilities: CapabilityTable,
    pub locations: LocationMapping,
    /// Capability table kept in its own YAML file, replacing `capabilities`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capabilities_file: Option<PathBuf>,
    /// Location mapping kept in its own YAML file, replacing `locations`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations_file: Option<PathBuf>,
}

/// Longest analysis window accepted, one leap year.
pub const MAX_CHECK_WINDOW_DAYS: u32 = 366;

/// Window sizes and coverage baselines used by the coverage analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Days analysed, ending today (CHECK_LAST_N_DAYS)
    pub check_window_days: u32,
    pub recent_window_days: u32,
    /// A type reaching this share of its expected files has adequate coverage
    pub coverage_threshold_pct: f64,
    pub min_expected_files_per_day: u32,
    /// Baseline for a type with no files anywhere in the window
    pub default_expected_files_per_day: u32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            check_window_days: 7,
            recent_window_days: 3,
            coverage_threshold_pct: 30.0,
            min_expected_files_per_day: 4,
            default_expected_files_per_day: 12,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassificationThresholds {
    /// Poor recent days for `critical`
    pub critical_recent_days: u32,
    /// Poor recent days for `warning`
    pub warning_recent_days: u32,
    /// Divert time share below which history explains nothing
    pub min_divert_percentage: f64,
    /// Explained share required before poor days are discounted
    pub explained_threshold_pct: f64,
    /// Recent divert time share that forgives one poor recent day
    pub recent_divert_softening_pct: f64,
    /// Poor days in the full window that count as a historical issue
    pub historical_poor_days: u32,
}

impl Default for ClassificationThresholds {
    fn default() -> Self {
        Self {
            critical_recent_days: 3,
            warning_recent_days: 2,
            min_divert_percentage: 5.0,
            explained_threshold_pct: 20.0,
            recent_divert_softening_pct: 15.0,
            historical_poor_days: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub max_workers: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { max_workers: 8 }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: MonitorConfig = serde_yaml::from_str(&content)?;
        config.load_tables(path.parent().unwrap_or_else(|| Path::new(".")))?;
        config.validate()?;
        Ok(config)
    }

    /// Replace the inline tables with the files named in the config.
    /// Relative paths are resolved against `base`.
    pub fn load_tables(&mut self, base: &Path) -> Result<()> {
        if let Some(file) = &self.capabilities_file {
            let path = base.join(file);
            self.capabilities = CapabilityTable::load(&path)?;
            info!(path = %path.display(), "Loaded capability table");
        }
        if let Some(file) = &self.locations_file {
            let path = base.join(file);
            self.locations = LocationMapping::load(&path)?;
            info!(path = %path.display(), "Loaded location mapping");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let analysis = &self.analysis;
        if analysis.check_window_days == 0 {
            return Err(MonitorError::Config(
                "check_window_days must be greater than zero".to_string(),
            ));
        }
        if analysis.check_window_days > MAX_CHECK_WINDOW_DAYS {
            return Err(MonitorError::Config(format!(
                "check_window_days ({}) exceeds the maximum of {}",
                analysis.check_window_days, MAX_CHECK_WINDOW_DAYS
            )));
        }
        if analysis.recent_window_days == 0 {
            return Err(MonitorError::Config(
                "recent_window_days must be greater than zero".to_string(),
            ));
        }
        if analysis.recent_window_days > analysis.check_window_days {
            return Err(MonitorError::Config(format!(
                "recent_window_days ({}) exceeds check_window_days ({})",
                analysis.recent_window_days, analysis.check_window_days
            )));
        }
        if !(analysis.coverage_threshold_pct > 0.0) {
            return Err(MonitorError::Config(format!(
                "coverage_threshold_pct must be positive, got {}",
                analysis.coverage_threshold_pct
            )));
        }
        if analysis.default_expected_files_per_day == 0 {
            return Err(MonitorError::Config(
                "default_expected_files_per_day must be greater than zero".to_string(),
            ));
        }
        if self.workers.max_workers == 0 {
            return Err(MonitorError::Config(
                "max_workers must be greater than zero".to_string(),
            ));
        }
        self.capabilities.validate()?;
        Ok(())
    }
}
