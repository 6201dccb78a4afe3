//! Track filter engine (§4.6): a multi-level cleanup + segmentation
//! pipeline used by the history endpoint. Each stage marks points rather
//! than removing them, so callers can see original shape alongside the
//! cleaned view.

pub mod chain;
pub mod duplicate;
pub mod precleanup;
pub mod segmentation;
pub mod teleportation;
pub mod types;

pub use chain::run as filter_track;
pub use types::{FilterLevel, FilterStatistics, FilteredTrack, SegmentSummary};
