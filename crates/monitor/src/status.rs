use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use hydrowatch_divert::{CurrentDivert, DivertPeriod, DivertSummary};
use hydrowatch_metadata::{DataType, MappingReport};

use crate::coverage::{CoverageReport, DailyTypeCoverage};

/// Health verdict for one device, in severity order for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallStatus {
    Good,
    Minor,
    Warning,
    Critical,
    Diverted,
    Error,
}

impl OverallStatus {
    pub const ALL: [OverallStatus; 6] = [
        OverallStatus::Good,
        OverallStatus::Minor,
        OverallStatus::Warning,
        OverallStatus::Critical,
        OverallStatus::Diverted,
        OverallStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OverallStatus::Good => "good",
            OverallStatus::Minor => "minor",
            OverallStatus::Warning => "warning",
            OverallStatus::Critical => "critical",
            OverallStatus::Diverted => "diverted",
            OverallStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How much of the window's missing coverage divert history accounts for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivertExplanation {
    /// Share of the window's time spent diverted
    pub divert_percentage: f64,
    /// `min(divert_percentage, avg_coverage_deficit)`
    pub explained_missing: f64,
    pub avg_coverage_deficit: f64,
    pub periods_count: usize,
    pub total_divert_seconds: i64,
}

/// Engine output for one device. Built once per cycle and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceStatus {
    pub device_code: String,
    pub location_code: String,
    pub overall_status: OverallStatus,
    pub status_message: String,
    pub days_since_last_data: u32,
    pub last_data_date: Option<NaiveDate>,
    /// Types below threshold on more than half the window
    pub missing_data_types: Vec<DataType>,
    /// Days on which no expected type had adequate coverage
    pub total_missing_days: u32,
    pub coverage_per_type: BTreeMap<DataType, f64>,
    pub days_missing_per_type: BTreeMap<DataType, u32>,
    pub expected_files_per_day: BTreeMap<DataType, u32>,
    pub daily_coverage: Vec<DailyTypeCoverage>,
    pub is_diverted: bool,
    pub divert_since: Option<DateTime<Utc>>,
    pub divert_explanation: Option<DivertExplanation>,
}

impl DeviceStatus {
    /// A device whose coverage was analysed and classified.
    pub fn analysed(
        device_code: &str,
        location_code: &str,
        coverage: CoverageReport,
        verdict: Verdict,
    ) -> Self {
        Self {
            device_code: device_code.to_string(),
            location_code: location_code.to_string(),
            overall_status: verdict.status,
            status_message: verdict.message,
            days_since_last_data: coverage.days_since_last_data,
            last_data_date: coverage.last_data_date,
            missing_data_types: coverage.full.frequently_missing,
            total_missing_days: coverage.full.poor_days,
            coverage_per_type: coverage.average_coverage,
            days_missing_per_type: coverage.full.missing_days_per_type,
            expected_files_per_day: coverage.expected_files_per_day,
            daily_coverage: coverage.daily,
            is_diverted: verdict.is_diverted,
            divert_since: verdict.divert_since,
            divert_explanation: verdict.divert_explanation,
        }
    }

    /// A device whose observations could not be fetched.
    pub fn failed(
        device_code: &str,
        location_code: &str,
        message: String,
        is_diverted: bool,
        divert_since: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            device_code: device_code.to_string(),
            location_code: location_code.to_string(),
            overall_status: OverallStatus::Error,
            status_message: message,
            days_since_last_data: 0,
            last_data_date: None,
            missing_data_types: Vec::new(),
            total_missing_days: 0,
            coverage_per_type: BTreeMap::new(),
            days_missing_per_type: BTreeMap::new(),
            expected_files_per_day: BTreeMap::new(),
            daily_coverage: Vec::new(),
            is_diverted,
            divert_since,
            divert_explanation: None,
        }
    }
}

/// Classifier output for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub status: OverallStatus,
    pub message: String,
    pub is_diverted: bool,
    pub divert_since: Option<DateTime<Utc>>,
    pub divert_explanation: Option<DivertExplanation>,
}

/// Device counts per status. Every status is present, zero or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub counts: BTreeMap<OverallStatus, usize>,
}

impl StatusSummary {
    pub fn from_statuses(statuses: &[DeviceStatus]) -> Self {
        let mut counts: BTreeMap<OverallStatus, usize> =
            OverallStatus::ALL.iter().map(|&s| (s, 0)).collect();
        for status in statuses {
            *counts.entry(status.overall_status).or_default() += 1;
        }
        Self {
            total: statuses.len(),
            counts,
        }
    }

    pub fn count(&self, status: OverallStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }
}

/// Everything one analysis cycle produces, as handed to the renderer.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub generated_at: DateTime<Utc>,
    pub check_window_days: u32,
    pub summary: StatusSummary,
    pub divert: DivertSummary,
    /// Switch position of every location with divert history
    pub current_diverts: BTreeMap<String, CurrentDivert>,
    /// Divert and bypass periods touching the analysis window
    pub window_periods: BTreeMap<String, Vec<DivertPeriod>>,
    pub mapping: MappingReport,
    pub devices: Vec<DeviceStatus>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(device: &str, status: OverallStatus) -> DeviceStatus {
        DeviceStatus {
            overall_status: status,
            ..DeviceStatus::failed(device, "LOC", "boom".to_string(), false, None)
        }
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&OverallStatus::Diverted).unwrap();
        assert_eq!(json, "\"diverted\"");
        let parsed: OverallStatus = serde_json::from_str("\"critical\"").unwrap();
        assert_eq!(parsed, OverallStatus::Critical);
        assert_eq!(OverallStatus::Warning.to_string(), "warning");
    }

    #[test]
    fn test_summary_counts_every_status() {
        let summary = StatusSummary::from_statuses(&[
            failed("A", OverallStatus::Good),
            failed("B", OverallStatus::Good),
            failed("C", OverallStatus::Error),
        ]);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.counts.len(), 6);
        assert_eq!(summary.count(OverallStatus::Good), 2);
        assert_eq!(summary.count(OverallStatus::Error), 1);
        assert_eq!(summary.count(OverallStatus::Critical), 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["counts"]["good"], 2);
        assert_eq!(json["counts"]["diverted"], 0);
    }

    #[test]
    fn test_failed_status_keeps_divert_fields() {
        let since = Utc::now();
        let status = DeviceStatus::failed("DEV", "LOC", "API error: timeout".to_string(), true, Some(since));
        assert_eq!(status.overall_status, OverallStatus::Error);
        assert!(status.is_diverted);
        assert_eq!(status.divert_since, Some(since));
        assert!(status.divert_explanation.is_none());
    }
}
