//! Divert history for hydrophone locations.
//!
//! Switch changes arrive as notices or pre-staged events. They are
//! normalized into [`DivertEvent`]s and folded into per-location
//! [`DivertPeriod`]s, which answer "was this location diverted, and for
//! how long" for any analysis window.

pub mod error;
pub mod event;
pub mod notice;
pub mod periods;

pub use error::DivertError;
pub use event::{ingest, DivertEvent, DivertStatus, IngestResult, RawDivertEvent};
pub use notice::{events_from_notices, parse_notice, DivertNotice, NoticeBatch, ParsedNotice};
pub use periods::{
    reconstruct_location, CurrentDivert, DivertIndex, DivertPeriod, DivertStatistics,
    DivertSummary,
};
