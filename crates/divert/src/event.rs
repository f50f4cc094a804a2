use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::warn;

use hydrowatch_metadata::DivertSystem;

use crate::error::DivertError;

/// Switch position reported for a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DivertStatus {
    /// Data routed away from the archive on purpose
    Divert,
    /// Normal routing
    Bypass,
}

impl DivertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DivertStatus::Divert => "Divert",
            DivertStatus::Bypass => "Bypass",
        }
    }
}

impl FromStr for DivertStatus {
    type Err = DivertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "divert" => Ok(DivertStatus::Divert),
            "bypass" => Ok(DivertStatus::Bypass),
            other => Err(DivertError::malformed(format!("unknown status '{}'", other))),
        }
    }
}

impl std::fmt::Display for DivertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single status change for one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivertEvent {
    pub location_code: String,
    pub status: DivertStatus,
    pub timestamp: DateTime<Utc>,
    pub system: Option<DivertSystem>,
}

impl DivertEvent {
    pub fn new(
        location_code: impl Into<String>,
        status: DivertStatus,
        timestamp: DateTime<Utc>,
        system: Option<DivertSystem>,
    ) -> Self {
        Self {
            location_code: location_code.into(),
            status,
            timestamp,
            system,
        }
    }
}

/// Divert event as staged by an upstream collaborator, not yet validated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDivertEvent {
    #[serde(default)]
    pub location_code: String,
    #[serde(default)]
    pub status: Option<String>,
    /// RFC 3339, or `YYYY-MM-DD HH:MM[:SS]` taken as UTC
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub system_id: Option<String>,
}

impl TryFrom<RawDivertEvent> for DivertEvent {
    type Error = DivertError;

    fn try_from(raw: RawDivertEvent) -> Result<Self, Self::Error> {
        let location_code = raw.location_code.trim().to_string();
        if location_code.is_empty() {
            return Err(DivertError::malformed("missing location code"));
        }

        let status = raw
            .status
            .as_deref()
            .ok_or_else(|| DivertError::malformed("missing status"))?
            .parse::<DivertStatus>()?;

        let timestamp = raw
            .timestamp
            .as_deref()
            .ok_or_else(|| DivertError::malformed("missing timestamp"))
            .and_then(parse_timestamp)?;

        let system = raw.system_id.as_deref().map(parse_system);

        Ok(DivertEvent {
            location_code,
            status,
            timestamp,
            system,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, DivertError> {
    let s = s.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| DivertError::malformed(format!("unparseable timestamp '{}'", s)))
}

fn parse_system(s: &str) -> DivertSystem {
    DivertSystem::from_subject(s).unwrap_or(DivertSystem::Unknown)
}

/// Outcome of validating a batch of raw events.
#[derive(Debug, Default)]
pub struct IngestResult {
    pub events: Vec<DivertEvent>,
    pub malformed: usize,
}

/// Validate raw events, dropping and counting the malformed ones.
pub fn ingest<I>(raw: I) -> IngestResult
where
    I: IntoIterator<Item = RawDivertEvent>,
{
    let mut result = IngestResult::default();
    for event in raw {
        let location = event.location_code.clone();
        match DivertEvent::try_from(event) {
            Ok(e) => result.events.push(e),
            Err(e) => {
                warn!(location = %location, error = %e, "Dropping malformed divert event");
                result.malformed += 1;
            }
        }
    }
    if result.malformed > 0 {
        warn!(
            dropped = result.malformed,
            kept = result.events.len(),
            "Malformed divert events dropped"
        );
    }
    result
}
