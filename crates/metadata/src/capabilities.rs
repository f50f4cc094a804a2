use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::data_type::DataType;
use crate::error::MetadataError;

/// Types every device is assumed to produce unless the table says otherwise.
pub const FALLBACK_DATA_TYPES: [DataType; 3] = [DataType::Fft, DataType::Flac, DataType::Mat];

/// Per-device product capabilities.
///
/// Lookup is exact match on the device code, falling back to `fallback`.
/// Prefixes and partial codes never match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CapabilityTable {
    #[serde(default = "default_fallback")]
    pub fallback: BTreeSet<DataType>,
    #[serde(default)]
    pub devices: HashMap<String, BTreeSet<DataType>>,
}

fn default_fallback() -> BTreeSet<DataType> {
    FALLBACK_DATA_TYPES.into_iter().collect()
}

impl Default for CapabilityTable {
    fn default() -> Self {
        let mut devices = HashMap::new();
        // BIIP - spectrograms only
        devices.insert("ICLISTENHF1354".to_string(), set(&[DataType::Fft]));
        // CCIP - no MAT output
        devices.insert(
            "ICLISTENHF1561".to_string(),
            set(&[DataType::Fft, DataType::Flac]),
        );
        // JASCO AMAR units on ECHO3 have no FFT stage
        for code in [
            "JASCOAMARHYDROPHONEE000186",
            "JASCOAMARHYDROPHONED001022",
            "JASCOAMARHYDROPHONED001025",
            "JASCOAMARHYDROPHONEE000029",
        ] {
            devices.insert(code.to_string(), set(&[DataType::Flac, DataType::Mat]));
        }

        Self {
            fallback: default_fallback(),
            devices,
        }
    }
}

fn set(types: &[DataType]) -> BTreeSet<DataType> {
    types.iter().copied().collect()
}

impl CapabilityTable {
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = std::fs::read_to_string(path)?;
        let table: CapabilityTable = serde_yaml::from_str(&content)?;
        table.validate()?;
        Ok(table)
    }

    /// Every entry, including the fallback, must name at least one type.
    pub fn validate(&self) -> Result<(), MetadataError> {
        if self.fallback.is_empty() {
            return Err(MetadataError::EmptyCapabilities("fallback".to_string()));
        }
        if let Some((code, _)) = self.devices.iter().find(|(_, types)| types.is_empty()) {
            return Err(MetadataError::EmptyCapabilities(code.clone()));
        }
        Ok(())
    }

    /// Expected data types for a device, in stable order.
    pub fn expected_data_types(&self, device_code: &str) -> Vec<DataType> {
        self.devices
            .get(device_code)
            .unwrap_or(&self.fallback)
            .iter()
            .copied()
            .collect()
    }

    pub fn has_override(&self, device_code: &str) -> bool {
        self.devices.contains_key(device_code)
    }
}
