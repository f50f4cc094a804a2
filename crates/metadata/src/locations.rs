//! Divert notice location names and the hydrophone locations they control.
//!
//! Divert notices name switch positions ("SoG_East", "[1] Barkley Cnyn"),
//! not location codes. One switch may feed several hydrophones, and the
//! NC-DDS system appears in notices both with and without its bracketed
//! index, so both spellings are mapped.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use crate::error::MetadataError;

/// Data distribution system that emits divert notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DivertSystem {
    #[serde(rename = "SoG DDS")]
    SogDds,
    #[serde(rename = "NC-DDS")]
    NcDds,
    #[serde(rename = "Saanich DDS")]
    SaanichDds,
    #[serde(rename = "Unknown")]
    Unknown,
}

impl DivertSystem {
    pub fn as_str(&self) -> &'static str {
        match self {
            DivertSystem::SogDds => "SoG DDS",
            DivertSystem::NcDds => "NC-DDS",
            DivertSystem::SaanichDds => "Saanich DDS",
            DivertSystem::Unknown => "Unknown",
        }
    }

    /// Detect the system from a notice subject line.
    pub fn from_subject(subject: &str) -> Option<Self> {
        if subject.contains("SoG DDS") {
            Some(DivertSystem::SogDds)
        } else if subject.contains("NC-DDS") {
            Some(DivertSystem::NcDds)
        } else if subject.contains("Saanich DDS") {
            Some(DivertSystem::SaanichDds)
        } else {
            None
        }
    }
}

impl std::fmt::Display for DivertSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const SOG_DDS_NAMES: &[&str] = &["SoG_East", "SoG_Delta", "SoG_Central"];
const SAANICH_DDS_NAMES: &[&str] = &["Saanich_Inlet"];
const NC_DDS_NAMES: &[&str] = &[
    "[1] Barkley Cnyn",
    "[2] ODP 1027",
    "[3] Endeavour",
    "[4] ODP 889",
    "[5] Folger Pass",
    "Barkley Cnyn",
    "ODP 1027",
    "Endeavour",
    "ODP 889",
    "Folger Pass",
];
const ODP_NAMES: &[&str] = &[
    "ODP 1027",
    "ODP 1364A",
    "ODP 1026",
    "ODP 889",
    "[2] ODP 1027",
    "[4] ODP 889",
];

/// Notice location name -> hydrophone location codes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct LocationMapping {
    entries: BTreeMap<String, Vec<String>>,
}

impl Default for LocationMapping {
    fn default() -> Self {
        let barkley = codes(&["BACNH.H1", "BACNH.H2", "BACNH.H3", "BACNH.H4", "BACUS"]);
        let cbch = codes(&["CBCH.H1", "CBCH.H2", "CBCH.H3", "CBCH.H4"]);
        let kemfh = codes(&["KEMFH.H1", "KEMFH.H2", "KEMFH.H3", "KEMFH.H4"]);
        let cqsh = codes(&["CQSH.H1", "CQSH.H2", "CQSH.H3", "CQSH.H4"]);

        let mut entries = BTreeMap::new();
        entries.insert(
            "SoG_East".to_string(),
            codes(&["ECHO3.H1", "ECHO3.H2", "ECHO3.H3", "ECHO3.H4"]),
        );
        entries.insert("SoG_Delta".to_string(), cbch.clone());
        entries.insert("SoG_Central".to_string(), codes(&["PSGCH.H1", "PSGCH.H3"]));
        entries.insert("Saanich_Inlet".to_string(), codes(&["PVIPH.H1", "PVIPH.H3"]));

        for prefix in ["[1] ", ""] {
            entries.insert(format!("{prefix}Barkley Cnyn"), barkley.clone());
        }
        for prefix in ["[2] ", ""] {
            entries.insert(format!("{prefix}ODP 1027"), cbch.clone());
        }
        for prefix in ["[3] ", ""] {
            entries.insert(format!("{prefix}Endeavour"), kemfh.clone());
        }
        // ODP 889 has no known hydrophone yet
        for prefix in ["[4] ", ""] {
            entries.insert(format!("{prefix}ODP 889"), Vec::new());
        }
        for prefix in ["[5] ", ""] {
            entries.insert(format!("{prefix}Folger Pass"), codes(&["FGPD"]));
        }

        entries.insert("ODP 1364A".to_string(), cqsh.clone());
        entries.insert("ODP 1026".to_string(), codes(&["NC27.H3", "NC27.H4"]));
        entries.insert("Burrard Inlet".to_string(), codes(&["BIIP"]));
        entries.insert("Cambridge Bay".to_string(), codes(&["CBYIP"]));
        entries.insert("China Creek".to_string(), codes(&["CCIP"]));
        entries.insert("Clayoquot Slope".to_string(), cqsh);
        entries.insert("Digby Island".to_string(), codes(&["DIIP"]));
        entries.insert("Hartley Bay".to_string(), codes(&["HBIP"]));
        entries.insert("Holyrood Bay".to_string(), codes(&["HRBIP"]));
        entries.insert("Kitamaat Village".to_string(), codes(&["KVIP"]));

        Self { entries }
    }
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Completeness report for a [`LocationMapping`].
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MappingReport {
    pub total_locations: usize,
    pub mapped_locations: usize,
    pub unmapped_locations: usize,
    pub mapping_completeness: f64,
    pub total_hydrophone_codes: usize,
    pub duplicate_assignments: usize,
    /// Notice names that are ODP borehole sites
    pub odp_sites: usize,
    pub unmapped_location_names: Vec<String>,
}

impl LocationMapping {
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Self {
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        let mapping: LocationMapping = serde_yaml::from_str(&content)?;
        Ok(mapping)
    }

    /// Location codes for a notice name, empty when the name is unknown.
    pub fn location_codes(&self, notice_name: &str) -> &[String] {
        self.entries
            .get(notice_name)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn contains(&self, notice_name: &str) -> bool {
        self.entries.contains_key(notice_name)
    }

    pub fn system_for(notice_name: &str) -> DivertSystem {
        if SOG_DDS_NAMES.contains(&notice_name) {
            DivertSystem::SogDds
        } else if NC_DDS_NAMES.contains(&notice_name) {
            DivertSystem::NcDds
        } else if SAANICH_DDS_NAMES.contains(&notice_name) {
            DivertSystem::SaanichDds
        } else {
            DivertSystem::Unknown
        }
    }

    pub fn is_odp_site(notice_name: &str) -> bool {
        ODP_NAMES.contains(&notice_name)
    }

    pub fn mapped_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, codes)| !codes.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn unmapped_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, codes)| codes.is_empty())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn validate(&self) -> MappingReport {
        let total_locations = self.entries.len();
        let mapped_locations = self.mapped_names().len();
        let unmapped: Vec<String> = self
            .unmapped_names()
            .into_iter()
            .map(String::from)
            .collect();

        let all_codes: Vec<&String> = self.entries.values().flatten().collect();
        let unique: BTreeSet<&String> = all_codes.iter().copied().collect();

        MappingReport {
            total_locations,
            mapped_locations,
            unmapped_locations: unmapped.len(),
            mapping_completeness: if total_locations > 0 {
                mapped_locations as f64 / total_locations as f64
            } else {
                0.0
            },
            total_hydrophone_codes: unique.len(),
            duplicate_assignments: all_codes.len() - unique.len(),
            odp_sites: self
                .entries
                .keys()
                .filter(|name| Self::is_odp_site(name))
                .count(),
            unmapped_location_names: unmapped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_bracketed_and_plain_names_map_alike() {
        let mapping = LocationMapping::default();
        assert_eq!(
            mapping.location_codes("[1] Barkley Cnyn"),
            mapping.location_codes("Barkley Cnyn")
        );
        assert!(mapping
            .location_codes("SoG_Delta")
            .contains(&"CBCH.H2".to_string()));
        assert!(mapping.location_codes("Nowhere").is_empty());
    }

    #[test]
    fn test_system_classification() {
        assert_eq!(LocationMapping::system_for("SoG_East"), DivertSystem::SogDds);
        assert_eq!(LocationMapping::system_for("[3] Endeavour"), DivertSystem::NcDds);
        assert_eq!(
            LocationMapping::system_for("Saanich_Inlet"),
            DivertSystem::SaanichDds
        );
        assert_eq!(LocationMapping::system_for("Burrard Inlet"), DivertSystem::Unknown);
        assert!(LocationMapping::is_odp_site("[4] ODP 889"));
        assert!(!LocationMapping::is_odp_site("Endeavour"));
    }

    #[test]
    fn test_system_from_subject() {
        assert_eq!(
            DivertSystem::from_subject("[Divert] NC-DDS 2025_07_01 14:44"),
            Some(DivertSystem::NcDds)
        );
        assert_eq!(DivertSystem::from_subject("weekly report"), None);
    }

    #[test]
    fn test_validate_report() {
        let report = LocationMapping::default().validate();
        assert_eq!(report.unmapped_location_names, vec!["ODP 889", "[4] ODP 889"]);
        assert_eq!(report.unmapped_locations, 2);
        assert_eq!(report.total_locations, report.mapped_locations + 2);
        // CBCH is fed by both SoG_Delta and ODP 1027
        assert!(report.duplicate_assignments > 0);
        assert_eq!(report.odp_sites, 6);
    }

    #[test]
    fn test_load_mapping() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
SoG_East: [ECHO3.H1]
"[9] New Site": []
"#
        )
        .unwrap();

        let mapping = LocationMapping::load(file.path()).unwrap();
        assert_eq!(mapping.location_codes("SoG_East"), ["ECHO3.H1".to_string()]);
        assert!(mapping.contains("[9] New Site"));
        assert_eq!(mapping.unmapped_names(), vec!["[9] New Site"]);
    }
}
