//! Domain types - core vocabulary of the aisle search
//!
//! - `types` - Detection events, wall readings, session state, summaries

pub mod types;

pub use types::{
    Aisle, BoundingBox, DetectionEvent, FoundItem, SearchOutcome, SearchSummary, SessionState,
    WallReading,
};
