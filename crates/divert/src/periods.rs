//! Divert period reconstruction.
//!
//! Periods are always rebuilt from the full event history. Events may
//! arrive in any order and more than once (one switch change is often
//! announced in several notices), so each location's events are
//! de-duplicated on `(timestamp, status)` and sorted before the walk.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, error, info};

use hydrowatch_metadata::DivertSystem;

use crate::error::DivertError;
use crate::event::{DivertEvent, DivertStatus};

/// A contiguous span during which a location held one status.
///
/// `end == None` means the status is still in effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DivertPeriod {
    pub location_code: String,
    pub status: DivertStatus,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub system: Option<DivertSystem>,
}

impl DivertPeriod {
    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// End of the period, with open periods running until `now`.
    pub fn end_or(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.end.unwrap_or(now)
    }

    /// Whether the period touches `[start, end]`.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.end_or(now) >= start && self.start <= end
    }

    /// Portion of the period inside `[start, end]`, zero when disjoint.
    pub fn clipped_duration(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Duration {
        let from = self.start.max(start);
        let to = self.end_or(now).min(end);
        if to <= from {
            Duration::zero()
        } else {
            to - from
        }
    }
}

/// Sort a single location's events and drop exact repeats.
///
/// Ties on timestamp are broken by status and then system so the order
/// never depends on arrival order.
fn normalize(events: &mut Vec<&DivertEvent>) {
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.status.cmp(&b.status))
            .then_with(|| a.system.cmp(&b.system))
    });
    events.dedup_by(|next, prev| next.timestamp == prev.timestamp && next.status == prev.status);
}

/// Rebuild the period list for one location.
///
/// Events for other locations are ignored.
pub fn reconstruct_location(
    location_code: &str,
    events: &[DivertEvent],
) -> Result<Vec<DivertPeriod>, DivertError> {
    let located: Vec<&DivertEvent> = events
        .iter()
        .filter(|e| e.location_code == location_code)
        .collect();
    build_periods(location_code, located)
}

fn build_periods(
    location_code: &str,
    mut located: Vec<&DivertEvent>,
) -> Result<Vec<DivertPeriod>, DivertError> {
    normalize(&mut located);

    let mut periods = Vec::new();
    let mut iter = located.into_iter();
    let Some(first) = iter.next() else {
        return Ok(periods);
    };

    let mut current = DivertPeriod {
        location_code: location_code.to_string(),
        status: first.status,
        start: first.timestamp,
        end: None,
        system: first.system,
    };

    for event in iter {
        if event.status == current.status {
            continue;
        }
        let next = DivertPeriod {
            location_code: location_code.to_string(),
            status: event.status,
            start: event.timestamp,
            end: None,
            system: event.system,
        };
        let mut closed = std::mem::replace(&mut current, next);
        closed.end = Some(event.timestamp);
        periods.push(closed);
    }
    periods.push(current);

    verify_periods(location_code, &periods)?;
    Ok(periods)
}

/// Check the period list invariants: ordered, contiguous, alternating,
/// and only the final period open.
pub(crate) fn verify_periods(location: &str, periods: &[DivertPeriod]) -> Result<(), DivertError> {
    let inconsistent = |reason: String| DivertError::InconsistentPeriodState {
        location: location.to_string(),
        reason,
    };

    for (i, period) in periods.iter().enumerate() {
        if period.location_code != location {
            return Err(inconsistent(format!(
                "period {} belongs to {}",
                i, period.location_code
            )));
        }
        if let Some(end) = period.end {
            if end < period.start {
                return Err(inconsistent(format!("period {} ends before it starts", i)));
            }
        }
    }

    for (i, pair) in periods.windows(2).enumerate() {
        let (prev, next) = (&pair[0], &pair[1]);
        match prev.end {
            None => {
                return Err(inconsistent(format!("open period {} is not the last", i)));
            }
            Some(end) if end != next.start => {
                return Err(inconsistent(format!(
                    "period {} ends at {} but period {} starts at {}",
                    i,
                    end,
                    i + 1,
                    next.start
                )));
            }
            Some(_) => {}
        }
        if prev.status == next.status {
            return Err(inconsistent(format!(
                "periods {} and {} share status {}",
                i,
                i + 1,
                prev.status
            )));
        }
    }
    Ok(())
}

/// Latest known switch position for a location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentDivert {
    pub status: DivertStatus,
    /// Timestamp of the most recent event seen
    pub timestamp: DateTime<Utc>,
    /// Start of the period the location is currently in
    pub since: DateTime<Utc>,
    pub system: Option<DivertSystem>,
}

/// Time spent per status inside an analysis window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DivertStatistics {
    pub location_code: String,
    pub analysis_start: DateTime<Utc>,
    pub analysis_end: DateTime<Utc>,
    pub total_analysis_seconds: i64,
    pub total_divert_seconds: i64,
    pub total_bypass_seconds: i64,
    pub divert_percentage: f64,
    pub bypass_percentage: f64,
    pub divert_periods_count: usize,
    pub bypass_periods_count: usize,
    /// Periods overlapping the window, including zero-length touches
    pub total_periods: usize,
}

impl DivertStatistics {
    /// Whole days diverted, rounded down.
    pub fn days_diverted(&self) -> i64 {
        self.total_divert_seconds / 86_400
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DivertSummary {
    pub total_monitored: usize,
    pub currently_diverted: usize,
    pub currently_bypass: usize,
    pub events_processed: usize,
    pub failed_locations: usize,
}

/// Reconstructed periods for every location seen in the event log.
///
/// Built once per analysis cycle and shared read-only between device tasks.
#[derive(Debug, Clone, Default)]
pub struct DivertIndex {
    periods: BTreeMap<String, Vec<DivertPeriod>>,
    failed_locations: BTreeSet<String>,
    last_seen: BTreeMap<String, DateTime<Utc>>,
    events_processed: usize,
}

impl DivertIndex {
    /// Rebuild every location's periods from the complete event log.
    ///
    /// A location whose periods fail verification is logged, recorded in
    /// [`DivertIndex::failed_locations`] and left without periods.
    pub fn build(events: &[DivertEvent]) -> Self {
        let mut by_location: BTreeMap<&str, Vec<&DivertEvent>> = BTreeMap::new();
        for event in events {
            by_location
                .entry(event.location_code.as_str())
                .or_default()
                .push(event);
        }

        let mut index = DivertIndex {
            events_processed: events.len(),
            ..Default::default()
        };

        for (location, located) in by_location {
            if let Some(latest) = located.iter().map(|e| e.timestamp).max() {
                index.last_seen.insert(location.to_string(), latest);
            }
            match build_periods(location, located) {
                Ok(periods) => {
                    debug!(location, periods = periods.len(), "Reconstructed divert periods");
                    index.periods.insert(location.to_string(), periods);
                }
                Err(e) => {
                    error!(location, error = %e, "Discarding divert history for location");
                    index.failed_locations.insert(location.to_string());
                    index.periods.insert(location.to_string(), Vec::new());
                }
            }
        }

        info!(
            locations = index.periods.len(),
            failed = index.failed_locations.len(),
            events = index.events_processed,
            "Divert index built"
        );
        index
    }

    pub fn periods(&self, location_code: &str) -> &[DivertPeriod] {
        self.periods
            .get(location_code)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn locations(&self) -> impl Iterator<Item = &str> {
        self.periods.keys().map(String::as_str)
    }

    pub fn failed_locations(&self) -> &BTreeSet<String> {
        &self.failed_locations
    }

    pub fn current(&self, location_code: &str) -> Option<CurrentDivert> {
        let period = self.periods(location_code).last()?;
        let latest = self.latest_event_time(location_code).unwrap_or(period.start);
        Some(CurrentDivert {
            status: period.status,
            timestamp: latest,
            since: period.start,
            system: period.system,
        })
    }

    // Same-status repeats are absorbed into the open period, so the most
    // recent event time is not stored on the period itself.
    fn latest_event_time(&self, location_code: &str) -> Option<DateTime<Utc>> {
        self.last_seen.get(location_code).copied()
    }

    /// The period a location was in at `at`. Events announced for a later
    /// time do not count yet.
    pub fn period_at(&self, location_code: &str, at: DateTime<Utc>) -> Option<&DivertPeriod> {
        self.periods(location_code)
            .iter()
            .rev()
            .find(|p| p.start <= at)
            .filter(|p| p.is_open() || p.end_or(at) > at)
    }

    /// The `Divert` period in effect at `now`, if there is one.
    pub fn active_divert(&self, location_code: &str, now: DateTime<Utc>) -> Option<&DivertPeriod> {
        self.period_at(location_code, now)
            .filter(|p| p.status == DivertStatus::Divert)
    }

    pub fn is_location_diverted(&self, location_code: &str, now: DateTime<Utc>) -> bool {
        self.active_divert(location_code, now).is_some()
    }

    /// Current switch position of every location with a known history.
    pub fn current_all(&self) -> BTreeMap<String, CurrentDivert> {
        self.locations()
            .filter_map(|loc| self.current(loc).map(|c| (loc.to_string(), c)))
            .collect()
    }

    /// Periods touching `[start, end]`, open periods running until `now`.
    pub fn periods_between(
        &self,
        location_code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<&DivertPeriod> {
        self.periods(location_code)
            .iter()
            .filter(|p| p.overlaps(start, end, now))
            .collect()
    }

    /// Periods touching `[start, end]` for every location that has any.
    pub fn all_periods_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> BTreeMap<&str, Vec<&DivertPeriod>> {
        self.locations()
            .map(|loc| (loc, self.periods_between(loc, start, end, now)))
            .filter(|(_, periods)| !periods.is_empty())
            .collect()
    }

    pub fn statistics(
        &self,
        location_code: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> DivertStatistics {
        let periods = self.periods_between(location_code, start, end, now);

        let mut divert = Duration::zero();
        let mut bypass = Duration::zero();
        let mut divert_periods_count = 0;
        let mut bypass_periods_count = 0;

        for period in &periods {
            let clipped = period.clipped_duration(start, end, now);
            if clipped <= Duration::zero() {
                continue;
            }
            match period.status {
                DivertStatus::Divert => {
                    divert += clipped;
                    divert_periods_count += 1;
                }
                DivertStatus::Bypass => {
                    bypass += clipped;
                    bypass_periods_count += 1;
                }
            }
        }

        let total = end - start;
        let total_seconds = total.num_seconds();
        let pct = |d: Duration| {
            if total_seconds > 0 {
                d.num_seconds() as f64 / total_seconds as f64 * 100.0
            } else {
                0.0
            }
        };

        DivertStatistics {
            location_code: location_code.to_string(),
            analysis_start: start,
            analysis_end: end,
            total_analysis_seconds: total_seconds,
            total_divert_seconds: divert.num_seconds(),
            total_bypass_seconds: bypass.num_seconds(),
            divert_percentage: pct(divert),
            bypass_percentage: pct(bypass),
            divert_periods_count,
            bypass_periods_count,
            total_periods: periods.len(),
        }
    }

    pub fn summary(&self) -> DivertSummary {
        let mut summary = DivertSummary {
            events_processed: self.events_processed,
            failed_locations: self.failed_locations.len(),
            ..Default::default()
        };
        for periods in self.periods.values() {
            let Some(last) = periods.last() else {
                continue;
            };
            summary.total_monitored += 1;
            match last.status {
                DivertStatus::Divert => summary.currently_diverted += 1,
                DivertStatus::Bypass => summary.currently_bypass += 1,
            }
        }
        summary
    }
}
