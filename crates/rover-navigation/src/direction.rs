//! Cardinal headings on the arena grid.

use std::fmt;

/// A 4-valued heading, declared in anticlockwise order so the discriminant is the
/// ordinal used by the planner's turn-cost model.
///
/// Rows grow upward: `Up` increases the row, `Right` increases the column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Direction {
    /// Towards higher row indices.
    Up = 0,
    /// Towards lower column indices.
    Left = 1,
    /// Towards lower row indices.
    Down = 2,
    /// Towards higher column indices.
    Right = 3,
}

impl Direction {
    /// All headings in ordinal order.
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Left, Direction::Down, Direction::Right];

    /// Returns the heading with the given ordinal, wrapping modulo 4.
    #[must_use]
    pub const fn from_ordinal(ordinal: usize) -> Self {
        match ordinal % 4 {
            0 => Direction::Up,
            1 => Direction::Left,
            2 => Direction::Down,
            _ => Direction::Right,
        }
    }

    /// Position in the anticlockwise cycle.
    #[must_use]
    pub const fn ordinal(self) -> usize {
        self as usize
    }

    /// The heading after a 90° turn to the right.
    #[must_use]
    pub const fn clockwise(self) -> Self {
        Self::from_ordinal(self.ordinal() + 3)
    }

    /// The heading after a 90° turn to the left.
    #[must_use]
    pub const fn anticlockwise(self) -> Self {
        Self::from_ordinal(self.ordinal() + 1)
    }

    /// The heading after a 180° turn.
    #[must_use]
    pub const fn opposite(self) -> Self {
        Self::from_ordinal(self.ordinal() + 2)
    }

    /// Unit step `(dx, dy)` in column/row terms.
    #[must_use]
    pub const fn delta(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Down => (0, -1),
            Direction::Right => (1, 0),
        }
    }

    /// Lowercase label used in exported state and configuration files.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Left => "left",
            Direction::Down => "down",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_identities() {
        for d in Direction::ALL {
            assert_eq!(d.clockwise().anticlockwise(), d, "clockwise then anticlockwise must be identity for {d}");
            assert_eq!(d.anticlockwise().clockwise(), d);
            assert_eq!(d.opposite().opposite(), d);
            assert_eq!(d.clockwise().clockwise(), d.opposite());
        }
    }

    #[test]
    fn test_clockwise_order() {
        assert_eq!(Direction::Up.clockwise(), Direction::Right);
        assert_eq!(Direction::Right.clockwise(), Direction::Down);
        assert_eq!(Direction::Down.clockwise(), Direction::Left);
        assert_eq!(Direction::Left.clockwise(), Direction::Up);
    }

    #[test]
    fn test_deltas_cancel_with_opposite() {
        for d in Direction::ALL {
            let (dx, dy) = d.delta();
            let (ox, oy) = d.opposite().delta();
            assert_eq!((dx + ox, dy + oy), (0, 0));
        }
        assert_eq!(Direction::Up.delta(), (0, 1), "rows grow upward");
    }
}
