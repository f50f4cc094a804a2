use prometheus::{Encoder, IntGaugeVec, Opts, Registry, TextEncoder};

use hydrowatch_divert::DivertSummary;

use crate::error::{MonitorError, Result};
use crate::status::{OverallStatus, StatusSummary};

/// Gauges describing one analysis cycle, rendered for a node-exporter
/// textfile collector.
pub struct ReportMetrics {
    pub registry: Registry,
    pub devices: IntGaugeVec,
    pub divert_locations: IntGaugeVec,
}

impl ReportMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let devices = IntGaugeVec::new(
            Opts::new("hydrowatch_devices", "Devices per overall status in the last cycle"),
            &["status"],
        )?;

        let divert_locations = IntGaugeVec::new(
            Opts::new(
                "hydrowatch_divert_locations",
                "Monitored divert locations per current switch status",
            ),
            &["status"],
        )?;

        registry.register(Box::new(devices.clone()))?;
        registry.register(Box::new(divert_locations.clone()))?;

        Ok(Self {
            registry,
            devices,
            divert_locations,
        })
    }

    pub fn record(&self, summary: &StatusSummary, divert: &DivertSummary) {
        for status in OverallStatus::ALL {
            self.devices
                .with_label_values(&[status.as_str()])
                .set(summary.count(status) as i64);
        }
        self.divert_locations
            .with_label_values(&["divert"])
            .set(divert.currently_diverted as i64);
        self.divert_locations
            .with_label_values(&["bypass"])
            .set(divert.currently_bypass as i64);
        self.divert_locations
            .with_label_values(&["failed"])
            .set(divert.failed_locations as i64);
    }

    /// Encode all gauges in the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| {
            MonitorError::Metrics(prometheus::Error::Msg(format!(
                "Failed to encode metrics as UTF-8: {}",
                e
            )))
        })
    }

    pub fn write_textfile(&self, path: &std::path::Path) -> Result<()> {
        let body = self.encode()?;
        std::fs::write(path, body).map_err(MonitorError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_status_gauges() {
        let metrics = ReportMetrics::new().unwrap();
        let summary = StatusSummary {
            total: 3,
            counts: [(OverallStatus::Good, 2), (OverallStatus::Diverted, 1)]
                .into_iter()
                .collect(),
        };
        let divert = DivertSummary {
            total_monitored: 4,
            currently_diverted: 1,
            currently_bypass: 3,
            events_processed: 10,
            failed_locations: 0,
        };
        metrics.record(&summary, &divert);

        let output = metrics.encode().unwrap();
        assert!(output.contains("# TYPE hydrowatch_devices gauge"));
        assert!(output.contains("hydrowatch_devices{status=\"good\"} 2"));
        assert!(output.contains("hydrowatch_devices{status=\"critical\"} 0"));
        assert!(output.contains("hydrowatch_divert_locations{status=\"bypass\"} 3"));
    }

    #[test]
    fn test_write_textfile() {
        let metrics = ReportMetrics::new().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hydrowatch.prom");
        metrics.write_textfile(&path).unwrap();
        assert!(path.exists());
    }
}
