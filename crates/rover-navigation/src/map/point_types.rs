//! Signed grid coordinates.

use crate::direction::Direction;

/// Represents a point in grid coordinates (cell indices).
///
/// Signed so that sensor rays and candidate steps may leave the grid; the map
/// rejects such points instead of the caller having to pre-check them.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GridPoint {
    /// The x-coordinate (column index) in the grid.
    pub x: i32,
    /// The y-coordinate (row index) in the grid.
    pub y: i32,
}

impl GridPoint {
    /// Creates a new `GridPoint`.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The point `steps` cells away along `dir`.
    #[must_use]
    pub const fn step(self, dir: Direction, steps: i32) -> Self {
        let (dx, dy) = dir.delta();
        Self::new(self.x + dx * steps, self.y + dy * steps)
    }

    /// Squared Euclidean distance, exact for ranking nearest cells.
    #[must_use]
    pub const fn distance_squared(self, other: GridPoint) -> i32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }

    /// Euclidean distance in cells.
    #[must_use]
    pub fn distance(self, other: GridPoint) -> f64 {
        f64::from(self.distance_squared(other)).sqrt()
    }
}

impl std::fmt::Display for GridPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
