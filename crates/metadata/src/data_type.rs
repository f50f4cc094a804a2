use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::MetadataError;

/// Product formats an archive may hold for a hydrophone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Wav,
    Fft,
    Mp3,
    Flac,
    Mat,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Wav => "wav",
            DataType::Fft => "fft",
            DataType::Mp3 => "mp3",
            DataType::Flac => "flac",
            DataType::Mat => "mat",
        }
    }

    /// Resolve a type from a filename's final extension (case-insensitive).
    ///
    /// Returns `None` when the filename has no extension or the extension
    /// is not a known product format.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        ext.parse().ok()
    }
}

impl FromStr for DataType {
    type Err = MetadataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wav" => Ok(DataType::Wav),
            "fft" => Ok(DataType::Fft),
            "mp3" => Ok(DataType::Mp3),
            "flac" => Ok(DataType::Flac),
            "mat" => Ok(DataType::Mat),
            _ => Err(MetadataError::UnknownDataType(s.to_string())),
        }
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
