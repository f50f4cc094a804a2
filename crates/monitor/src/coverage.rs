//! Coverage analyzer.
//!
//! Turns a device's file observations into per-day, per-type coverage
//! against a baseline estimated from the window itself. A type's baseline
//! is the median daily count over the days it produced anything (floored
//! at `min_expected_files_per_day`), or `default_expected_files_per_day`
//! when it produced nothing at all.

use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use hydrowatch_metadata::DataType;

use crate::config::AnalysisConfig;
use crate::observation::FileObservation;

/// `days` calendar days ending on (and including) `today`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisWindow {
    pub today: NaiveDate,
    pub days: u32,
}

impl AnalysisWindow {
    pub fn new(today: NaiveDate, days: u32) -> Self {
        Self { today, days }
    }

    pub fn first_day(&self) -> NaiveDate {
        self.today
            .checked_sub_days(Days::new(u64::from(self.days.saturating_sub(1))))
            .unwrap_or(NaiveDate::MIN)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.days > 0 && date >= self.first_day() && date <= self.today
    }

    /// Dates in the window, oldest first.
    pub fn dates(&self) -> impl Iterator<Item = NaiveDate> {
        let first = self.first_day();
        (0..self.days).filter_map(move |offset| first.checked_add_days(Days::new(u64::from(offset))))
    }

    /// The trailing `days` of this window.
    pub fn recent(&self, days: u32) -> AnalysisWindow {
        AnalysisWindow::new(self.today, days.min(self.days))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyTypeCoverage {
    pub date: NaiveDate,
    pub data_type: DataType,
    pub actual_count: u32,
    pub expected_count: u32,
    pub coverage_pct: f64,
}

/// Threshold results over one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowCoverage {
    pub window_days: u32,
    /// Days on which no expected type reached the threshold
    pub poor_days: u32,
    pub missing_days_per_type: BTreeMap<DataType, u32>,
    /// Types below threshold on more than half the window
    pub frequently_missing: Vec<DataType>,
}

impl WindowCoverage {
    pub fn is_clean(&self) -> bool {
        self.poor_days == 0 && self.frequently_missing.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoverageReport {
    pub expected_types: Vec<DataType>,
    pub expected_files_per_day: BTreeMap<DataType, u32>,
    /// Oldest day first, expected types in order within a day
    pub daily: Vec<DailyTypeCoverage>,
    pub average_coverage: BTreeMap<DataType, f64>,
    pub full: WindowCoverage,
    pub recent: WindowCoverage,
    pub last_data_date: Option<NaiveDate>,
    pub days_since_last_data: u32,
}

impl CoverageReport {
    /// Mean over expected types of `max(0, 100 - average coverage)`.
    pub fn avg_coverage_deficit(&self) -> f64 {
        if self.expected_types.is_empty() {
            return 0.0;
        }
        let total: f64 = self
            .expected_types
            .iter()
            .map(|t| {
                let avg = self.average_coverage.get(t).copied().unwrap_or(0.0);
                (100.0 - avg).max(0.0)
            })
            .sum();
        total / self.expected_types.len() as f64
    }
}

/// Baseline daily file count for one type.
///
/// `counts` holds the count for each day that had at least one file. The
/// median is the upper middle element for even lengths.
pub fn expected_count(counts: &[u32], min_per_day: u32, default_per_day: u32) -> u32 {
    if counts.is_empty() {
        return default_per_day;
    }
    let mut sorted = counts.to_vec();
    sorted.sort_unstable();
    sorted[sorted.len() / 2].max(min_per_day)
}

pub struct CoverageAnalyzer<'a> {
    config: &'a AnalysisConfig,
}

impl<'a> CoverageAnalyzer<'a> {
    pub fn new(config: &'a AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn analyze(
        &self,
        expected: &[DataType],
        observations: &[FileObservation],
        today: NaiveDate,
    ) -> CoverageReport {
        let window = AnalysisWindow::new(today, self.config.check_window_days);

        let mut counts: BTreeMap<(NaiveDate, DataType), u32> = BTreeMap::new();
        for obs in observations {
            if window.contains(obs.date) && expected.contains(&obs.data_type) {
                *counts.entry((obs.date, obs.data_type)).or_default() += 1;
            }
        }

        let expected_files_per_day: BTreeMap<DataType, u32> = expected
            .iter()
            .map(|&data_type| {
                let per_day: Vec<u32> = counts
                    .iter()
                    .filter(|((_, t), _)| *t == data_type)
                    .map(|(_, &n)| n)
                    .collect();
                let baseline = expected_count(
                    &per_day,
                    self.config.min_expected_files_per_day,
                    self.config.default_expected_files_per_day,
                );
                (data_type, baseline)
            })
            .collect();

        let mut daily = Vec::with_capacity(window.days as usize * expected.len());
        for date in window.dates() {
            let mut files_on_day = 0;
            for &data_type in expected {
                let actual_count = counts.get(&(date, data_type)).copied().unwrap_or(0);
                let expected_count = expected_files_per_day[&data_type];
                files_on_day += actual_count;
                daily.push(DailyTypeCoverage {
                    date,
                    data_type,
                    actual_count,
                    expected_count,
                    coverage_pct: f64::from(actual_count) * 100.0 / f64::from(expected_count),
                });
            }
            debug!(%date, files = files_on_day, "Daily coverage");
        }

        let average_coverage = expected
            .iter()
            .map(|&data_type| {
                let values: Vec<f64> = daily
                    .iter()
                    .filter(|d| d.data_type == data_type)
                    .map(|d| d.coverage_pct)
                    .collect();
                let avg = if values.is_empty() {
                    0.0
                } else {
                    values.iter().sum::<f64>() / values.len() as f64
                };
                (data_type, avg)
            })
            .collect();

        let full = self.window_coverage(&daily, expected, &window);
        let recent = self.window_coverage(
            &daily,
            expected,
            &window.recent(self.config.recent_window_days),
        );

        let last_data_date = counts.keys().map(|(date, _)| *date).max();
        let days_since_last_data = match last_data_date {
            Some(last) => u32::try_from((today - last).num_days()).unwrap_or(0),
            None => window.days,
        };

        CoverageReport {
            expected_types: expected.to_vec(),
            expected_files_per_day,
            daily,
            average_coverage,
            full,
            recent,
            last_data_date,
            days_since_last_data,
        }
    }

    fn window_coverage(
        &self,
        daily: &[DailyTypeCoverage],
        expected: &[DataType],
        window: &AnalysisWindow,
    ) -> WindowCoverage {
        let threshold = self.config.coverage_threshold_pct;
        let mut missing_days_per_type: BTreeMap<DataType, u32> =
            expected.iter().map(|&t| (t, 0)).collect();
        let mut poor_days = 0;

        for date in window.dates() {
            let mut adequate = false;
            for cov in daily.iter().filter(|d| d.date == date) {
                if cov.coverage_pct >= threshold {
                    adequate = true;
                } else if let Some(missing) = missing_days_per_type.get_mut(&cov.data_type) {
                    *missing += 1;
                }
            }
            if !adequate {
                poor_days += 1;
            }
        }

        let frequently_missing = missing_days_per_type
            .iter()
            .filter(|(_, missing)| **missing > window.days / 2)
            .map(|(&t, _)| t)
            .collect();

        WindowCoverage {
            window_days: window.days,
            poor_days,
            missing_days_per_type,
            frequently_missing,
        }
    }
}
