//! Divert notice parsing.
//!
//! Notices are plain-text messages announcing a new switch line-up. The
//! subject carries the effective time (`2025_07_01 14:44`) and the system
//! name; the body lists every switch under a `New Switch Line-Up:` header:
//!
//! ```text
//! New Switch Line-Up:
//! SoG_East: Bypass
//! SoG_Delta: Divert
//! [1] Barkley Cnyn: Divert
//! ______________________________
//! ```
//!
//! Retrieval of the messages themselves happens upstream.

use chrono::{DateTime, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use hydrowatch_metadata::{DivertSystem, LocationMapping};

use crate::event::{DivertEvent, DivertStatus};

const LINEUP_HEADER: &str = "New Switch Line-Up:";

static SUBJECT_TIMESTAMP: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4}_\d{2}_\d{2}\s+\d{2}:\d{2})").unwrap());

static LOCATION_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([A-Za-z0-9_\[\] ]+):\s*(bypass|divert)\b").unwrap());

/// A divert notice as retrieved from the mail service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DivertNotice {
    pub subject: String,
    #[serde(default)]
    pub body: String,
}

impl DivertNotice {
    /// Whether the subject looks like a divert notification at all.
    pub fn is_divert_subject(&self) -> bool {
        self.subject.contains("[Divert]") || self.subject.contains("DDS")
    }
}

/// Fields extracted from one notice, keyed by notice location name.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedNotice {
    pub timestamp: Option<DateTime<Utc>>,
    pub system: Option<DivertSystem>,
    pub locations: BTreeMap<String, DivertStatus>,
}

pub fn parse_notice(notice: &DivertNotice) -> ParsedNotice {
    ParsedNotice {
        timestamp: parse_subject_timestamp(&notice.subject),
        system: DivertSystem::from_subject(&notice.subject),
        locations: parse_lineup(&notice.body),
    }
}

fn parse_subject_timestamp(subject: &str) -> Option<DateTime<Utc>> {
    let raw = SUBJECT_TIMESTAMP.captures(subject)?.get(1)?.as_str();
    let normalized = raw
        .replace('_', "-")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

fn is_separator(line: &str) -> bool {
    line.len() > 20 && (line.matches('_').count() > 10 || line.matches('-').count() > 10)
}

fn parse_lineup(body: &str) -> BTreeMap<String, DivertStatus> {
    let mut locations = BTreeMap::new();
    let Some(start) = body.find(LINEUP_HEADER) else {
        return locations;
    };

    for line in body[start..].lines().skip(1) {
        if is_separator(line) {
            break;
        }
        for caps in LOCATION_LINE.captures_iter(line) {
            let name = caps[1].trim();
            if name.is_empty() {
                continue;
            }
            if let Ok(status) = caps[2].parse::<DivertStatus>() {
                // A later line for the same switch wins
                locations.insert(name.to_string(), status);
            }
        }
    }
    locations
}

/// Events extracted from a batch of notices.
#[derive(Debug, Default)]
pub struct NoticeBatch {
    pub events: Vec<DivertEvent>,
    /// Notices that carried switch positions
    pub notices_used: usize,
    /// Notices with switch positions but no parseable timestamp
    pub malformed: usize,
    /// Notice location names missing from the mapping
    pub unmapped_names: BTreeSet<String>,
}

/// Parse notices and expand each switch position to its hydrophone locations.
pub fn events_from_notices(notices: &[DivertNotice], mapping: &LocationMapping) -> NoticeBatch {
    let mut batch = NoticeBatch::default();

    for notice in notices.iter().filter(|n| n.is_divert_subject()) {
        let parsed = parse_notice(notice);
        if parsed.locations.is_empty() {
            debug!(subject = %notice.subject, "Notice has no switch line-up, skipping");
            continue;
        }
        batch.notices_used += 1;

        let Some(timestamp) = parsed.timestamp else {
            warn!(subject = %notice.subject, "Notice has no timestamp, dropping its events");
            batch.malformed += 1;
            continue;
        };

        for (name, status) in &parsed.locations {
            if !mapping.contains(name) {
                batch.unmapped_names.insert(name.clone());
                continue;
            }
            // Subjects without a system name fall back to the switch's known system
            let system = parsed.system.or_else(|| {
                Some(LocationMapping::system_for(name)).filter(|s| *s != DivertSystem::Unknown)
            });
            for code in mapping.location_codes(name) {
                batch
                    .events
                    .push(DivertEvent::new(code.clone(), *status, timestamp, system));
            }
        }
    }

    if !batch.unmapped_names.is_empty() {
        warn!(names = ?batch.unmapped_names, "Notice locations without a mapping");
    }
    batch
}
