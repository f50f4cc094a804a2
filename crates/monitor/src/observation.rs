//! Archive listing entries and the file observations derived from them.

use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use hydrowatch_metadata::DataType;

use crate::coverage::AnalysisWindow;

static FILENAME_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{8})").unwrap());

/// One file as returned by the archive listing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub filename: String,
    /// Start of the file's data, RFC 3339
    #[serde(default, rename = "dateFrom", alias = "date_from")]
    pub date_from: Option<String>,
}

impl ListingEntry {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            date_from: None,
        }
    }

    /// Calendar date of the file.
    ///
    /// A parseable `dateFrom` wins; otherwise the first eight-digit run in
    /// the filename is read as `YYYYMMDD`.
    pub fn date(&self) -> Option<NaiveDate> {
        let explicit = self.date_from.as_deref().and_then(|raw| {
            let parsed = DateTime::parse_from_rfc3339(raw.trim()).ok();
            if parsed.is_none() {
                debug!(filename = %self.filename, date_from = raw, "Unparseable dateFrom");
            }
            parsed
        });
        if let Some(ts) = explicit {
            return Some(ts.date_naive());
        }
        let digits = FILENAME_DATE.captures(&self.filename)?.get(1)?.as_str();
        NaiveDate::parse_from_str(digits, "%Y%m%d").ok()
    }

    pub fn data_type(&self) -> Option<DataType> {
        DataType::from_filename(&self.filename)
    }
}

/// One observed file, reduced to what coverage needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct FileObservation {
    pub date: NaiveDate,
    pub data_type: DataType,
}

/// Resolve listing entries into observations for one device.
///
/// Entries with an unresolvable date, an unknown or unexpected type, or a
/// date outside the window are skipped.
pub fn resolve_observations(
    entries: &[ListingEntry],
    expected: &[DataType],
    window: &AnalysisWindow,
) -> Vec<FileObservation> {
    let mut skipped = 0usize;
    let observations: Vec<FileObservation> = entries
        .iter()
        .filter_map(|entry| {
            let resolved = entry
                .data_type()
                .filter(|t| expected.contains(t))
                .zip(entry.date().filter(|d| window.contains(*d)))
                .map(|(data_type, date)| FileObservation { date, data_type });
            if resolved.is_none() {
                skipped += 1;
            }
            resolved
        })
        .collect();

    if skipped > 0 {
        debug!(
            kept = observations.len(),
            skipped, "Listing entries skipped during resolution"
        );
    }
    observations
}
