//! Shared types for the aisle search controller

use serde::{Deserialize, Serialize};

/// Newtype wrapper for aisle indices to provide type safety
///
/// Aisles are 1-based; 0 is never a valid aisle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Aisle(pub u32);

impl std::fmt::Display for Aisle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Detection bounding box in frame pixel coordinates
///
/// Carried through for downstream consumers; the search logic itself
/// only looks at labels and confidence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// A single labeled observation from the vision backend for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub label: String,
    /// Confidence score in [0, 1]
    pub confidence: f32,
    #[serde(default, rename = "box", skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<BoundingBox>,
}

impl DetectionEvent {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self { label: label.into(), confidence, bounding_box: None }
    }
}

/// Interpreted sonar sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallReading {
    /// Path ahead is clear
    Clear,
    /// Wall or obstacle within the configured threshold
    Blocked,
}

impl WallReading {
    /// Threshold a raw distance sample (centimeters) against the
    /// configured wall distance.
    #[inline]
    pub fn from_distance_cm(distance_cm: u32, threshold_cm: u32) -> Self {
        if distance_cm <= threshold_cm {
            WallReading::Blocked
        } else {
            WallReading::Clear
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WallReading::Clear => "clear",
            WallReading::Blocked => "blocked",
        }
    }
}

/// How a completed run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOutcome {
    /// Every wanted item was found and removed from the registry
    AllFound,
    /// The aisle bound was reached with items still wanted
    Exhausted,
}

impl SearchOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchOutcome::AllFound => "all_found",
            SearchOutcome::Exhausted => "exhausted",
        }
    }
}

/// Session lifecycle state, owned exclusively by the session controller
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Idle,
    Searching,
    Completed(SearchOutcome),
    Failed(String),
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Searching => "searching",
            SessionState::Completed(_) => "completed",
            SessionState::Failed(_) => "failed",
        }
    }

    #[inline]
    pub fn is_searching(&self) -> bool {
        matches!(self, SessionState::Searching)
    }
}

/// One located item in the end-of-run summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundItem {
    pub item: String,
    pub aisle: Aisle,
}

/// End-of-run location summary, in the order items were found
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchSummary {
    pub entries: Vec<FoundItem>,
}

impl SearchSummary {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Display for SearchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "no items located");
        }
        for (i, found) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{} (aisle {})", found.item, found.aisle)?;
        }
        Ok(())
    }
}
