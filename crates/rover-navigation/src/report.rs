//! Status snapshot exported to external consumers.

use crate::surface::CaptureRecord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Snapshot of everything an external status consumer needs.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct StateReport {
    /// Rover column.
    pub x: i32,
    /// Rover row.
    pub y: i32,
    /// Lowercase heading label.
    pub heading: String,
    /// Guard-framed explored bitmap as hex.
    pub explored: String,
    /// Obstacle bitmap over explored cells as hex.
    pub obstacles: String,
    /// Percentage of the arena explored.
    pub explored_pct: f64,
    /// Last human-readable status message.
    pub status: String,
    /// Obstacle faces recognised so far.
    pub captures: Vec<CaptureRecord>,
}
