//! Correlation and status classifier.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. an open `Divert` period makes the device `diverted`
//! 2. divert history that explains the window's coverage gaps discounts
//!    the poor days it accounts for
//! 3. otherwise the raw recent coverage decides, with the recent window
//!    weighted over the full one
//!
//! Fetch failures never reach the classifier; the orchestrator turns them
//! into `error` statuses directly.
//!
//! The explanation compares a share of window *time* (divert percentage)
//! with a share of expected *files* (coverage deficit). The two are not
//! the same unit; the comparison is kept as-is to match existing reports.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use hydrowatch_divert::{DivertIndex, DivertStatistics};

use crate::config::{AnalysisConfig, ClassificationThresholds};
use crate::coverage::CoverageReport;
use crate::status::{DivertExplanation, OverallStatus, Verdict};

pub struct Classifier<'a> {
    analysis: &'a AnalysisConfig,
    thresholds: &'a ClassificationThresholds,
}

impl<'a> Classifier<'a> {
    pub fn new(analysis: &'a AnalysisConfig, thresholds: &'a ClassificationThresholds) -> Self {
        Self {
            analysis,
            thresholds,
        }
    }

    pub fn classify(
        &self,
        coverage: &CoverageReport,
        divert: &DivertIndex,
        location_code: &str,
        now: DateTime<Utc>,
    ) -> Verdict {
        let active = divert.active_divert(location_code, now);
        let divert_since = active.map(|p| p.start);

        let window_start = now - Duration::days(i64::from(self.analysis.check_window_days));
        let stats = divert.statistics(location_code, window_start, now, now);
        let divert_explanation = self.explain(coverage, &stats);

        let (status, message) = if let Some(since) = divert_since {
            self.diverted(coverage, since)
        } else if let Some(explanation) = divert_explanation
            .as_ref()
            .filter(|e| e.explained_missing > self.thresholds.explained_threshold_pct)
        {
            self.explained_by_history(coverage, explanation, divert, location_code, now)
        } else {
            self.from_coverage(coverage)
        };

        debug!(
            location = location_code,
            %status,
            recent_poor = coverage.recent.poor_days,
            poor = coverage.full.poor_days,
            "Classified device"
        );

        Verdict {
            status,
            message,
            is_diverted: divert_since.is_some(),
            divert_since,
            divert_explanation,
        }
    }

    /// Divert history worth reporting for the window, if any.
    pub fn explain(
        &self,
        coverage: &CoverageReport,
        stats: &DivertStatistics,
    ) -> Option<DivertExplanation> {
        if stats.total_periods == 0 || stats.divert_percentage <= self.thresholds.min_divert_percentage {
            return None;
        }
        let avg_coverage_deficit = coverage.avg_coverage_deficit();
        Some(DivertExplanation {
            divert_percentage: stats.divert_percentage,
            explained_missing: stats.divert_percentage.min(avg_coverage_deficit),
            avg_coverage_deficit,
            periods_count: stats.divert_periods_count,
            total_divert_seconds: stats.total_divert_seconds,
        })
    }

    fn diverted(&self, coverage: &CoverageReport, since: DateTime<Utc>) -> (OverallStatus, String) {
        let since = since.format("%Y-%m-%d %H:%M");
        let message = if coverage.recent.is_clean() {
            format!("DIVERTED - Data still arriving despite divert (since {})", since)
        } else {
            format!("DIVERTED - Missing data expected (since {})", since)
        };
        (OverallStatus::Diverted, message)
    }

    fn explained_by_history(
        &self,
        coverage: &CoverageReport,
        explanation: &DivertExplanation,
        divert: &DivertIndex,
        location_code: &str,
        now: DateTime<Utc>,
    ) -> (OverallStatus, String) {
        let days_diverted = u32::try_from(explanation.total_divert_seconds / 86_400).unwrap_or(0);
        let unexplained_missing = coverage.full.poor_days.saturating_sub(days_diverted);

        let recent_start = now - Duration::days(i64::from(self.analysis.recent_window_days));
        let recent_stats = divert.statistics(location_code, recent_start, now, now);
        let mut unexplained_recent = coverage.recent.poor_days;
        if recent_stats.divert_percentage > self.thresholds.recent_divert_softening_pct {
            unexplained_recent = unexplained_recent.saturating_sub(1);
        }

        let deficit = explanation.avg_coverage_deficit;
        if unexplained_recent >= self.thresholds.warning_recent_days
            && unexplained_missing >= self.thresholds.historical_poor_days
        {
            (
                OverallStatus::Warning,
                format!(
                    "Coverage issues beyond diversions ({}d diverted, {:.1}% avg deficit)",
                    days_diverted, deficit
                ),
            )
        } else if unexplained_recent >= 1 || unexplained_missing >= 2 {
            (
                OverallStatus::Minor,
                format!(
                    "Minor coverage issues beyond diversions ({}d diverted of {}d)",
                    days_diverted, self.analysis.check_window_days
                ),
            )
        } else {
            (
                OverallStatus::Good,
                format!(
                    "Coverage gaps explained by diversions ({}d diverted, {:.1}% deficit)",
                    days_diverted, deficit
                ),
            )
        }
    }

    fn from_coverage(&self, coverage: &CoverageReport) -> (OverallStatus, String) {
        let recent = &coverage.recent;
        let poor_recent = |n: u32| {
            format!(
                "Poor data coverage for {} recent {}",
                n,
                if n == 1 { "day" } else { "days" }
            )
        };

        if recent.poor_days >= self.thresholds.critical_recent_days {
            (OverallStatus::Critical, poor_recent(recent.poor_days))
        } else if recent.poor_days >= self.thresholds.warning_recent_days {
            (OverallStatus::Warning, poor_recent(recent.poor_days))
        } else if recent.frequently_missing.len() >= 2 {
            (
                OverallStatus::Warning,
                format!("Recently missing data types: {}", join_types(&recent.frequently_missing)),
            )
        } else if recent.frequently_missing.len() == 1 {
            (
                OverallStatus::Minor,
                format!("Recently missing data type: {}", join_types(&recent.frequently_missing)),
            )
        } else if recent.is_clean() && self.has_historical_issues(coverage) {
            (
                OverallStatus::Good,
                "Recently resolved - all data types now available".to_string(),
            )
        } else {
            (
                OverallStatus::Good,
                "All expected data types available".to_string(),
            )
        }
    }

    fn has_historical_issues(&self, coverage: &CoverageReport) -> bool {
        coverage.full.poor_days >= self.thresholds.historical_poor_days
            || !coverage.full.frequently_missing.is_empty()
    }
}

fn join_types(types: &[hydrowatch_metadata::DataType]) -> String {
    let mut names: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
    names.sort_unstable();
    names.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use hydrowatch_divert::{DivertEvent, DivertStatus};
    use hydrowatch_metadata::DataType;

    use crate::coverage::CoverageAnalyzer;
    use crate::observation::FileObservation;

    const LOC: &str = "CBCH.H1";

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 7, 12, 0, 0).unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 7, d).unwrap()
    }

    /// `per_day[i]` files of `data_type` on July `i + 1`.
    fn observations(data_type: DataType, per_day: [usize; 7]) -> Vec<FileObservation> {
        per_day
            .iter()
            .enumerate()
            .flat_map(|(i, &n)| {
                vec![
                    FileObservation {
                        date: day(i as u32 + 1),
                        data_type,
                    };
                    n
                ]
            })
            .collect()
    }

    fn report(expected: &[DataType], observations: &[FileObservation]) -> CoverageReport {
        let config = AnalysisConfig::default();
        CoverageAnalyzer::new(&config).analyze(expected, observations, day(7))
    }

    fn classify(coverage: &CoverageReport, index: &DivertIndex) -> Verdict {
        classify_with(coverage, index, &ClassificationThresholds::default())
    }

    fn classify_with(
        coverage: &CoverageReport,
        index: &DivertIndex,
        thresholds: &ClassificationThresholds,
    ) -> Verdict {
        let analysis = AnalysisConfig::default();
        Classifier::new(&analysis, thresholds).classify(coverage, index, LOC, now())
    }

    fn event(status: DivertStatus, ts: DateTime<Utc>) -> DivertEvent {
        DivertEvent::new(LOC, status, ts, None)
    }

    #[test]
    fn test_no_data_is_critical() {
        let verdict = classify(&report(&[DataType::Flac], &[]), &DivertIndex::default());
        assert_eq!(verdict.status, OverallStatus::Critical);
        assert_eq!(verdict.message, "Poor data coverage for 3 recent days");
        assert!(!verdict.is_diverted);
    }

    #[test]
    fn test_active_divert_beats_critical() {
        let index = DivertIndex::build(&[
            event(DivertStatus::Bypass, now() - Duration::days(30)),
            event(DivertStatus::Divert, now() - Duration::days(1)),
        ]);
        let verdict = classify(&report(&[DataType::Flac], &[]), &index);
        assert_eq!(verdict.status, OverallStatus::Diverted);
        assert!(verdict.is_diverted);
        assert_eq!(verdict.divert_since, Some(now() - Duration::days(1)));
        assert!(verdict.message.contains("Missing data expected"));
    }

    #[test]
    fn test_active_divert_with_clean_coverage() {
        let index = DivertIndex::build(&[event(DivertStatus::Divert, now() - Duration::hours(2))]);
        let coverage = report(&[DataType::Flac], &observations(DataType::Flac, [12; 7]));
        let verdict = classify(&coverage, &index);
        assert_eq!(verdict.status, OverallStatus::Diverted);
        assert!(verdict.message.contains("still arriving"));
    }

    #[test]
    fn test_announced_future_divert_is_not_active() {
        let index = DivertIndex::build(&[
            event(DivertStatus::Bypass, now() - Duration::days(30)),
            event(DivertStatus::Divert, now() + Duration::days(1)),
        ]);
        let verdict = classify(&report(&[DataType::Flac], &[]), &index);
        assert_eq!(verdict.status, OverallStatus::Critical);
        assert!(!verdict.is_diverted);
        assert_eq!(verdict.divert_since, None);
        assert!(verdict.divert_explanation.is_none());
    }

    #[test]
    fn test_single_type_missing_is_minor() {
        let mut obs = observations(DataType::Flac, [12; 7]);
        obs.extend(observations(DataType::Fft, [0; 7]));
        let verdict = classify(
            &report(&[DataType::Fft, DataType::Flac], &obs),
            &DivertIndex::default(),
        );
        assert_eq!(verdict.status, OverallStatus::Minor);
        assert_eq!(verdict.message, "Recently missing data type: fft");
    }

    #[test]
    fn test_two_types_missing_is_warning() {
        let obs = observations(DataType::Flac, [12; 7]);
        let verdict = classify(
            &report(&[DataType::Fft, DataType::Flac, DataType::Mat], &obs),
            &DivertIndex::default(),
        );
        assert_eq!(verdict.status, OverallStatus::Warning);
        assert_eq!(verdict.message, "Recently missing data types: fft, mat");
    }

    #[test]
    fn test_two_poor_recent_days_is_warning() {
        let obs = observations(DataType::Flac, [12, 12, 12, 12, 12, 0, 0]);
        let verdict = classify(&report(&[DataType::Flac], &obs), &DivertIndex::default());
        assert_eq!(verdict.status, OverallStatus::Warning);
        assert_eq!(verdict.message, "Poor data coverage for 2 recent days");
    }

    #[test]
    fn test_recently_resolved() {
        let obs = observations(DataType::Flac, [0, 0, 0, 0, 12, 12, 12]);
        let verdict = classify(&report(&[DataType::Flac], &obs), &DivertIndex::default());
        assert_eq!(verdict.status, OverallStatus::Good);
        assert_eq!(verdict.message, "Recently resolved - all data types now available");
    }

    #[test]
    fn test_all_good() {
        let obs = observations(DataType::Flac, [12; 7]);
        let verdict = classify(&report(&[DataType::Flac], &obs), &DivertIndex::default());
        assert_eq!(verdict.status, OverallStatus::Good);
        assert_eq!(verdict.message, "All expected data types available");
        assert!(verdict.divert_explanation.is_none());
    }

    #[test]
    fn test_history_explains_gaps() {
        // Diverted for four days in the middle of the window, data missing then
        let index = DivertIndex::build(&[
            event(DivertStatus::Divert, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()),
            event(DivertStatus::Bypass, Utc.with_ymd_and_hms(2025, 7, 5, 0, 0, 0).unwrap()),
        ]);
        let obs = observations(DataType::Flac, [0, 0, 0, 0, 12, 12, 12]);
        let verdict = classify(&report(&[DataType::Flac], &obs), &index);

        let explanation = verdict.divert_explanation.clone().unwrap();
        assert_eq!(explanation.total_divert_seconds, 4 * 86_400);
        assert!((explanation.divert_percentage - 400.0 / 7.0).abs() < 1e-9);
        assert!((explanation.avg_coverage_deficit - 400.0 / 7.0).abs() < 1e-9);
        assert_eq!(explanation.periods_count, 1);

        assert_eq!(verdict.status, OverallStatus::Good);
        assert_eq!(
            verdict.message,
            "Coverage gaps explained by diversions (4d diverted, 57.1% deficit)"
        );
        assert!(!verdict.is_diverted);
    }

    #[test]
    fn test_history_leaves_recent_gaps_unexplained() {
        // Diverted early in the window, but the last three days are empty too
        let index = DivertIndex::build(&[
            event(DivertStatus::Divert, Utc.with_ymd_and_hms(2025, 6, 30, 12, 0, 0).unwrap()),
            event(DivertStatus::Bypass, Utc.with_ymd_and_hms(2025, 7, 2, 12, 0, 0).unwrap()),
        ]);
        let obs = observations(DataType::Flac, [0, 0, 12, 12, 0, 0, 0]);
        let verdict = classify(&report(&[DataType::Flac], &obs), &index);

        assert_eq!(verdict.status, OverallStatus::Warning);
        assert!(verdict.message.starts_with("Coverage issues beyond diversions (2d diverted"));
    }

    #[test]
    fn test_small_divert_share_is_ignored() {
        let index = DivertIndex::build(&[
            event(DivertStatus::Divert, Utc.with_ymd_and_hms(2025, 7, 3, 0, 0, 0).unwrap()),
            event(DivertStatus::Bypass, Utc.with_ymd_and_hms(2025, 7, 3, 4, 0, 0).unwrap()),
        ]);
        let verdict = classify(&report(&[DataType::Flac], &[]), &index);
        assert!(verdict.divert_explanation.is_none());
        assert_eq!(verdict.status, OverallStatus::Critical);
    }

    #[test]
    fn test_explained_share_must_exceed_threshold() {
        // Baseline 10; the window averages 80%, a 20% deficit
        let obs = observations(DataType::Flac, [10, 10, 10, 10, 6, 6, 4]);
        let coverage = report(&[DataType::Flac], &obs);
        assert_eq!(coverage.avg_coverage_deficit(), 20.0);

        let index = DivertIndex::build(&[
            event(DivertStatus::Divert, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()),
            event(DivertStatus::Bypass, Utc.with_ymd_and_hms(2025, 7, 4, 0, 0, 0).unwrap()),
        ]);
        let verdict = classify(&coverage, &index);

        let explanation = verdict.divert_explanation.clone().unwrap();
        assert_eq!(explanation.explained_missing, 20.0);
        assert_eq!(verdict.status, OverallStatus::Good);
        assert_eq!(verdict.message, "All expected data types available");
    }

    #[test]
    fn test_recent_divert_softens_one_poor_day() {
        // Diverted July 4 and 5; July 5 is the only poor day in the recent window
        let index = DivertIndex::build(&[
            event(DivertStatus::Divert, Utc.with_ymd_and_hms(2025, 7, 4, 0, 0, 0).unwrap()),
            event(DivertStatus::Bypass, Utc.with_ymd_and_hms(2025, 7, 6, 0, 0, 0).unwrap()),
        ]);
        let obs = observations(DataType::Flac, [12, 12, 12, 0, 0, 12, 12]);
        let coverage = report(&[DataType::Flac], &obs);
        assert_eq!(coverage.recent.poor_days, 1);

        let verdict = classify(&coverage, &index);
        assert_eq!(verdict.status, OverallStatus::Good);
        assert_eq!(
            verdict.message,
            "Coverage gaps explained by diversions (2d diverted, 28.6% deficit)"
        );

        // Half of the recent window was diverted, below a 100% softening bar
        let thresholds = ClassificationThresholds {
            recent_divert_softening_pct: 100.0,
            ..Default::default()
        };
        let verdict = classify_with(&coverage, &index, &thresholds);
        assert_eq!(verdict.status, OverallStatus::Minor);
        assert_eq!(
            verdict.message,
            "Minor coverage issues beyond diversions (2d diverted of 7d)"
        );
    }

    #[test]
    fn test_unexplained_history_alone_is_minor() {
        // Four poor days, two of them diverted; the recent window is clean
        let index = DivertIndex::build(&[
            event(DivertStatus::Divert, Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap()),
            event(DivertStatus::Bypass, Utc.with_ymd_and_hms(2025, 7, 3, 0, 0, 0).unwrap()),
        ]);
        let obs = observations(DataType::Flac, [0, 0, 0, 0, 12, 12, 12]);
        let coverage = report(&[DataType::Flac], &obs);
        assert_eq!(coverage.full.poor_days, 4);
        assert_eq!(coverage.recent.poor_days, 0);

        let verdict = classify(&coverage, &index);
        let explanation = verdict.divert_explanation.clone().unwrap();
        assert!((explanation.explained_missing - 200.0 / 7.0).abs() < 1e-9);
        assert_eq!(verdict.status, OverallStatus::Minor);
        assert_eq!(
            verdict.message,
            "Minor coverage issues beyond diversions (2d diverted of 7d)"
        );
    }
}
