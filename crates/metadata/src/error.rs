use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("failed to read metadata file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse metadata YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unknown data type: {0}")]
    UnknownDataType(String),
    #[error("capability table for {0} is empty")]
    EmptyCapabilities(String),
}
