//! hydrowatch-metadata: static device and divert-location tables

pub mod capabilities;
pub mod data_type;
pub mod error;
pub mod locations;

pub use capabilities::{CapabilityTable, FALLBACK_DATA_TYPES};
pub use data_type::DataType;
pub use error::MetadataError;
pub use locations::{DivertSystem, LocationMapping, MappingReport};
