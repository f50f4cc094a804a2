//! Error types for hydrowatch-divert

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DivertError {
    /// Event without a usable location, status or timestamp
    #[error("malformed divert event: {reason}")]
    MalformedEvent { reason: String },

    /// Reconstructed periods for a location overlap or leave gaps
    #[error("inconsistent divert periods for {location}: {reason}")]
    InconsistentPeriodState { location: String, reason: String },
}

impl DivertError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        DivertError::MalformedEvent {
            reason: reason.into(),
        }
    }
}
