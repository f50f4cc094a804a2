//! hydrowatch-monitor: coverage analysis and divert-aware health
//! classification for a fleet of hydrophones.

pub mod classifier;
pub mod config;
pub mod coverage;
pub mod error;
pub mod metrics;
pub mod observation;
pub mod orchestrator;
pub mod status;

pub use classifier::Classifier;
pub use config::{AnalysisConfig, ClassificationThresholds, MonitorConfig, WorkerConfig};
pub use coverage::{
    expected_count, AnalysisWindow, CoverageAnalyzer, CoverageReport, DailyTypeCoverage,
    WindowCoverage,
};
pub use error::{MonitorError, ObservationFetchError, Result};
pub use metrics::ReportMetrics;
pub use observation::{resolve_observations, FileObservation, ListingEntry};
pub use orchestrator::{analyze_device, DeviceInput, Orchestrator, StagedDevice};
pub use status::{
    AnalysisReport, DeviceStatus, DivertExplanation, OverallStatus, StatusSummary, Verdict,
};
